//! Command-line driver: read an input script and run it.

use std::process::ExitCode;

use mpm::input;
use mpm::simulation::Simulation;

fn usage() -> ExitCode {
    eprintln!("usage: mpm -i <input-script>");
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let mut infile = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-i" | "-in" => match iter.next() {
                Some(path) => infile = Some(path.clone()),
                None => return usage(),
            },
            _ => return usage(),
        }
    }
    let Some(infile) = infile else {
        return usage();
    };

    let script = match std::fs::read_to_string(&infile) {
        Ok(text) => text,
        Err(err) => {
            log::error!("cannot open input script {infile}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut sim = Simulation::serial();
    match input::run_script(&mut sim, &script) {
        Ok(()) => {
            log::info!(
                "finished at step {} (t = {:.6e})",
                sim.ntimestep,
                sim.time
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
