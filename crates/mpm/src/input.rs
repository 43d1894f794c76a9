//! Input-script processing: whitespace-separated commands, `#` comments,
//! and a shared variable map for parsed scalars.

use nalgebra::Vector3;

use crate::damage::Damage;
use crate::dump::Dump;
use crate::eos::Eos;
use crate::error::{MpmError, Result};
use crate::fix::Fix;
use crate::group::GroupKind;
use crate::material::Material;
use crate::method::{FlowVariant, Method, MethodStyle};
use crate::kernels::ShapeFunction;
use crate::region::Region;
use crate::simulation::Simulation;
use crate::strength::Strength;

/// Execute every command in `text` against the simulation.
pub fn run_script(sim: &mut Simulation, text: &str) -> Result<()> {
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let content = raw.split('#').next().unwrap_or("");
        let tokens: Vec<&str> = content.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        dispatch(sim, &tokens, line).map_err(|e| match e {
            // Attach the script line to bare parse problems.
            MpmError::Parse { line: 0, msg } => MpmError::Parse { line, msg },
            other => other,
        })?;
    }
    Ok(())
}

/// A parsed scalar: float literal or the name of a published variable.
fn parsev(sim: &Simulation, token: &str) -> Result<f64> {
    if let Ok(v) = token.parse::<f64>() {
        return Ok(v);
    }
    sim.vars.get(token).copied().ok_or_else(|| MpmError::Parse {
        line: 0,
        msg: format!("expected a number or variable, got '{token}'"),
    })
}

fn parse_all(sim: &Simulation, tokens: &[&str]) -> Result<Vec<f64>> {
    tokens.iter().map(|t| parsev(sim, t)).collect()
}

fn optional(sim: &Simulation, token: &str) -> Result<Option<f64>> {
    if token == "NULL" {
        Ok(None)
    } else {
        parsev(sim, token).map(Some)
    }
}

fn arity(cmd: &str, usage: &str) -> MpmError {
    MpmError::Parse {
        line: 0,
        msg: format!("{cmd}: wrong number of arguments, expected: {usage}"),
    }
}

fn dispatch(sim: &mut Simulation, tokens: &[&str], line: usize) -> Result<()> {
    let cmd = tokens[0];
    let args = &tokens[1..];
    match cmd {
        "dimension" => match args {
            [d] => {
                let d = parsev(sim, d)? as usize;
                sim.domain.set_dimension(d)
            }
            _ => Err(arity(cmd, "dimension <1|2|3>")),
        },
        "domain" => {
            let bounds = parse_all(sim, args)?;
            sim.domain.set_box(&bounds)
        }
        "method" => parse_method(sim, args),
        "region" => match args {
            [id, "block", rest @ ..] => {
                let bounds = parse_all(sim, rest)?;
                let region = Region::block(&bounds, sim.domain.dimension)?;
                sim.domain.add_region(id, region)
            }
            _ => Err(arity(cmd, "region <id> block <bounds...>")),
        },
        "eos" => match args {
            [id, style, rest @ ..] => {
                let params = parse_all(sim, rest)?;
                let eos = Eos::from_args(style, &params)?;
                sim.materials.add_eos(id, eos)
            }
            _ => Err(arity(cmd, "eos <id> <style> <params...>")),
        },
        "strength" => match args {
            [id, style, rest @ ..] => {
                let params = parse_all(sim, rest)?;
                let strength = Strength::from_args(style, &params)?;
                sim.materials.add_strength(id, strength)
            }
            _ => Err(arity(cmd, "strength <id> <style> <params...>")),
        },
        "damage" => match args {
            [id, style, rest @ ..] => {
                let params = parse_all(sim, rest)?;
                let damage = Damage::from_args(style, &params)?;
                sim.materials.add_damage(id, damage)
            }
            _ => Err(arity(cmd, "damage <id> <style> <params...>")),
        },
        "material" => parse_material(sim, args),
        "solid" => match args {
            [id, region, ppc, mat] => {
                let ppc = parsev(sim, ppc)? as u8;
                sim.add_solid(id, region, ppc, mat, None)
            }
            [id, region, ppc, mat, cellsize] => {
                let ppc = parsev(sim, ppc)? as u8;
                let cs = parsev(sim, cellsize)?;
                sim.add_solid(id, region, ppc, mat, Some(cs))
            }
            _ => Err(arity(
                cmd,
                "solid <id> <region> <1|2|3> <material> [cellsize]",
            )),
        },
        "group" => match args {
            [id, kind, "region", region] => {
                let kind = match *kind {
                    "particles" => GroupKind::Particles,
                    "nodes" => GroupKind::Nodes,
                    other => {
                        return Err(MpmError::parse(
                            line,
                            format!("group kind must be particles or nodes, got '{other}'"),
                        ))
                    }
                };
                sim.add_group(id, kind, region)
            }
            _ => Err(arity(cmd, "group <id> <particles|nodes> region <region>")),
        },
        "fix" => parse_fix(sim, args),
        "dump" => match args {
            [id, "particles", every, pattern] => {
                let every = parsev(sim, every)? as u64;
                sim.dumps.push(Dump::new(id, every, pattern));
                Ok(())
            }
            _ => Err(arity(cmd, "dump <id> particles <every> <pattern>")),
        },
        "restart" => match args {
            [every, pattern] => {
                let every = parsev(sim, every)? as u64;
                sim.restart_every = Some((every, pattern.to_string()));
                Ok(())
            }
            _ => Err(arity(cmd, "restart <every> <pattern>")),
        },
        "read_restart" => match args {
            [path] => sim.load_restart(std::path::Path::new(path)),
            _ => Err(arity(cmd, "read_restart <file>")),
        },
        "timestep" => match args {
            [dt] => {
                sim.dt = parsev(sim, dt)?;
                Ok(())
            }
            _ => Err(arity(cmd, "timestep <dt>")),
        },
        "dt_factor" => match args {
            [f] => {
                sim.dt_factor = parsev(sim, f)?;
                Ok(())
            }
            _ => Err(arity(cmd, "dt_factor <factor>")),
        },
        "variable" => match args {
            [name, value] => {
                let v = parsev(sim, value)?;
                sim.vars.insert(name.to_string(), v);
                Ok(())
            }
            _ => Err(arity(cmd, "variable <name> <value>")),
        },
        "run" => match args {
            [n] => sim.run(parsev(sim, n)? as u64),
            _ => Err(arity(cmd, "run <nsteps>")),
        },
        "run_time" => match args {
            [t] => sim.run_time(parsev(sim, t)?),
            _ => Err(arity(cmd, "run_time <duration>")),
        },
        "run_until" => match args {
            [t] => sim.run_until(parsev(sim, t)?),
            _ => Err(arity(cmd, "run_until <time>")),
        },
        "run_while" => match args {
            [var, op, value] => {
                let less_than = match *op {
                    "lt" => true,
                    "gt" => false,
                    other => {
                        return Err(MpmError::parse(
                            line,
                            format!("run_while operator must be lt or gt, got '{other}'"),
                        ))
                    }
                };
                let v = parsev(sim, value)?;
                sim.run_while(var, less_than, v)
            }
            _ => Err(arity(cmd, "run_while <var> <lt|gt> <value>")),
        },
        "delete_particles" => match args {
            [region] => sim.delete_particles(region),
            _ => Err(arity(cmd, "delete_particles <region>")),
        },
        other => Err(MpmError::parse(line, format!("unknown command '{other}'"))),
    }
}

fn parse_method(sim: &mut Simulation, args: &[&str]) -> Result<()> {
    let style = args
        .first()
        .ok_or_else(|| arity("method", "method <style> [flow] [flip <a>] [shape <name>]"))?;
    let mut method = Method::new(MethodStyle::from_name(style)?);

    let mut it = args[1..].iter();
    while let Some(tok) = it.next() {
        if let Some(flow) = FlowVariant::from_name(tok) {
            method.flow = flow;
        } else if *tok == "flip" {
            let alpha = it.next().ok_or_else(|| {
                MpmError::parse(0, "method: flip expects a blend value".to_string())
            })?;
            method.alpha = parsev(sim, alpha)?;
        } else if *tok == "shape" {
            let name = it.next().ok_or_else(|| {
                MpmError::parse(0, "method: shape expects a family name".to_string())
            })?;
            method.shape = ShapeFunction::from_name(name)?;
        } else {
            return Err(MpmError::parse(
                0,
                format!("method: unexpected token '{tok}'"),
            ));
        }
    }
    sim.set_method(method)
}

fn parse_material(sim: &mut Simulation, args: &[&str]) -> Result<()> {
    match args {
        [id, "linear", rho0, e, nu] => {
            let mat = Material::linear(
                id,
                parsev(sim, rho0)?,
                parsev(sim, e)?,
                parsev(sim, nu)?,
            )?;
            sim.materials.add_material(mat).map(|_| ())
        }
        [id, "neo-hookean", rho0, e, nu] => {
            let mat = Material::neo_hookean(
                id,
                parsev(sim, rho0)?,
                parsev(sim, e)?,
                parsev(sim, nu)?,
            )?;
            sim.materials.add_material(mat).map(|_| ())
        }
        [id, "eos-strength", rho0, eos_id, strength_id, rest @ ..] => {
            let rho0 = parsev(sim, rho0)?;
            let eos = *sim.materials.find_eos(eos_id).ok_or_else(|| {
                MpmError::config(format!("eos '{eos_id}' does not exist"))
            })?;
            let strength = *sim.materials.find_strength(strength_id).ok_or_else(|| {
                MpmError::config(format!("strength '{strength_id}' does not exist"))
            })?;
            let damage = match rest {
                [] => None,
                [damage_id] => Some(*sim.materials.find_damage(damage_id).ok_or_else(
                    || MpmError::config(format!("damage '{damage_id}' does not exist")),
                )?),
                _ => {
                    return Err(arity(
                        "material",
                        "material <id> eos-strength <rho0> <eos> <strength> [damage]",
                    ))
                }
            };
            let mat = Material::with_models(id, rho0, eos, strength, damage)?;
            sim.materials.add_material(mat).map(|_| ())
        }
        _ => Err(arity(
            "material",
            "material <id> <linear|neo-hookean|eos-strength> <params...>",
        )),
    }
}

fn parse_fix(sim: &mut Simulation, args: &[&str]) -> Result<()> {
    let (id, kind, group, rest) = match args {
        [id, kind, group, rest @ ..] => (*id, *kind, *group, rest),
        _ => return Err(arity("fix", "fix <id> <kind> <group> <params...>")),
    };
    let groupbit = sim.groups.bit(group)?;
    let fix = match kind {
        "initial_velocity_particles" => match rest {
            [vx, vy, vz] => Fix::InitialVelocityParticles {
                id: id.to_string(),
                groupbit,
                v: [
                    optional(sim, vx)?,
                    optional(sim, vy)?,
                    optional(sim, vz)?,
                ],
            },
            _ => {
                return Err(arity(
                    "fix",
                    "fix <id> initial_velocity_particles <group> <vx|NULL> <vy|NULL> <vz|NULL>",
                ))
            }
        },
        "velocity_nodes" => match rest {
            [vx, vy, vz] => Fix::VelocityNodes {
                id: id.to_string(),
                groupbit,
                v: [
                    optional(sim, vx)?,
                    optional(sim, vy)?,
                    optional(sim, vz)?,
                ],
            },
            _ => {
                return Err(arity(
                    "fix",
                    "fix <id> velocity_nodes <group> <vx|NULL> <vy|NULL> <vz|NULL>",
                ))
            }
        },
        "body_force" => match rest {
            [bx, by, bz] => Fix::BodyForce {
                id: id.to_string(),
                groupbit,
                b: Vector3::new(parsev(sim, bx)?, parsev(sim, by)?, parsev(sim, bz)?),
            },
            _ => return Err(arity("fix", "fix <id> body_force <group> <bx> <by> <bz>")),
        },
        "strain_energy" => match rest {
            [] => Fix::StrainEnergy {
                id: id.to_string(),
                groupbit,
            },
            _ => return Err(arity("fix", "fix <id> strain_energy <group>")),
        },
        other => {
            return Err(MpmError::parse(
                0,
                format!("unknown fix kind '{other}'"),
            ))
        }
    };
    sim.add_fix(fix, group)
}
