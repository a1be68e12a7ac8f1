//! `aistackctl`: the CLI binary driving the fleet manager.

use std::collections::HashMap;

use aistack::{
    cli::{self, Commands},
    config::Config,
    container::Runtime,
    diagnostics,
    error::{AistackError, Result},
    manager::{FleetManager, FleetUpdateOutcome},
    probe::NvidiaSmiGpuProbe,
    repair, report,
    service::{Service, ServiceSpec},
    suspend::SuspendController,
    update::Updater,
    version_lock, wol,
};
use tracing::error;

/// Builds the well-known service registry, re-resolving each service's
/// image reference through the version lock.
fn default_specs() -> HashMap<String, ServiceSpec> {
    let defaults = [
        (
            "alt-runtime",
            "ghcr.io/huggingface/text-generation-inference:latest",
            "http://127.0.0.1:8081/health",
            vec!["alt-runtime-models".to_string()],
        ),
        (
            "llm-runtime",
            "ollama/ollama:0.3.0",
            "http://127.0.0.1:11434/",
            vec!["llm-runtime-models".to_string()],
        ),
        (
            "frontend",
            "ghcr.io/open-webui/open-webui:latest",
            "http://127.0.0.1:8080/health",
            vec!["frontend-data".to_string()],
        ),
    ];

    let mut specs = HashMap::new();
    for (name, default_image, health_url, volumes) in defaults {
        // `EnforceImagePolicy` (run as each service's pre-start hook) is
        // what actually pulls a pinned `pull_ref` and retags it onto the
        // floating reference; the reference a service runs under always
        // stays the default/floating `tag_ref`.
        let resolved = version_lock::resolve(name, default_image).unwrap_or_else(|err| {
            error!("version-lock resolution failed for '{name}', using default image: {err}");
            version_lock::ResolvedImage {
                pull_ref: default_image.to_string(),
                tag_ref: default_image.to_string(),
            }
        });
        specs.insert(
            name.to_string(),
            ServiceSpec {
                name: name.to_string(),
                image_ref: resolved.tag_ref,
                health_url: health_url.to_string(),
                env: vec![],
                ports: vec![],
                volumes,
            },
        );
    }
    specs
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    println!("{rendered}");
    Ok(())
}

fn run() -> Result<()> {
    let args = cli::parse_args();
    aistack::logging::init(args.log_level);

    let specs = default_specs();
    let runtime = Runtime::resolve()?;
    let manager = FleetManager::new(&runtime, specs.clone());

    match args.command {
        Commands::InstallProfile { profile } => {
            manager.install_profile(&profile)?;
            println!("install-profile '{profile}' complete");
        }

        Commands::Start { service } => match service {
            Some(name) => {
                manager.start_service(&name)?;
                println!("started '{name}'");
            }
            None => {
                manager.start_all()?;
                println!("started whole fleet");
            }
        },

        Commands::Stop { service } => match service {
            Some(name) => {
                manager.stop_service(&name)?;
                println!("stopped '{name}'");
            }
            None => {
                manager.stop_all()?;
                println!("stopped whole fleet");
            }
        },

        Commands::Status { service, json } => match service {
            Some(name) => {
                let spec = specs
                    .get(&name)
                    .ok_or_else(|| AistackError::Precondition(format!("unknown service '{name}'")))?;
                let state = Service::new(spec.clone(), &runtime).status()?;
                if json {
                    print_json(&serde_json::json!({ "name": name, "state": state.to_string() }))?;
                } else {
                    println!("{name}: {state}");
                }
            }
            None => {
                let fleet_report = report::generate_report(&specs, &runtime)?;
                if json {
                    print_json(&fleet_report)?;
                } else {
                    for entry in &fleet_report.services {
                        println!("{}: {} (health={}, {})", entry.name, entry.state, entry.health, entry.message);
                    }
                    println!("gpu lock: {}", fleet_report.gpu_lock_holder);
                }
            }
        },

        Commands::Update { service, all } => {
            let config = Config::load();
            if all {
                let outcomes = manager.update_all_services(&config)?;
                let mut failed = 0;
                for outcome in &outcomes {
                    match outcome {
                        FleetUpdateOutcome::Completed(plan) => {
                            println!("{}: completed ({})", plan.service_name, plan.new_image_id)
                        }
                        FleetUpdateOutcome::Unchanged(plan) => {
                            println!("{}: unchanged ({})", plan.service_name, plan.new_image_id)
                        }
                        FleetUpdateOutcome::RolledBack(plan) => {
                            println!("{}: rolled back to {}", plan.service_name, plan.old_image_id)
                        }
                        FleetUpdateOutcome::Failed { service, detail } => {
                            failed += 1;
                            eprintln!("{service}: failed: {detail}");
                        }
                    }
                }
                if failed > 0 {
                    return Err(AistackError::Precondition(format!("{failed} service(s) failed to update")));
                }
            } else {
                let name = service
                    .ok_or_else(|| AistackError::Precondition("update requires a service name or --all".into()))?;
                if config.updates.mode == aistack::config::UpdateMode::Pinned {
                    return Err(AistackError::Precondition(
                        "update refused: update policy is 'pinned'".into(),
                    ));
                }
                let spec = specs
                    .get(&name)
                    .ok_or_else(|| AistackError::Precondition(format!("unknown service '{name}'")))?;
                let resolved = version_lock::resolve(&name, &spec.image_ref)?;
                let updater = Updater::new(&runtime);
                let plan = updater.update(spec, &resolved)?;
                println!("{}: {:?}", plan.service_name, plan.status);
            }
        }

        Commands::Rollback { service } => {
            let spec = specs
                .get(&service)
                .ok_or_else(|| AistackError::Precondition(format!("unknown service '{service}'")))?;
            let updater = Updater::new(&runtime);
            let plan = updater.rollback_last(spec)?;
            println!("{}: rolled back to {}", plan.service_name, plan.old_image_id);
        }

        Commands::Repair { service } => match service {
            Some(name) => {
                let spec = specs
                    .get(&name)
                    .ok_or_else(|| AistackError::Precondition(format!("unknown service '{name}'")))?;
                let outcome = repair::repair_service(spec, &runtime)?;
                println!("{}: {} (restarted={})", outcome.service, outcome.state, outcome.restarted);
            }
            None => {
                for result in repair::repair_all(&specs, &runtime) {
                    match result {
                        Ok(outcome) => println!("{}: {} (restarted={})", outcome.service, outcome.state, outcome.restarted),
                        Err(err) => eprintln!("repair failed: {err}"),
                    }
                }
            }
        },

        Commands::Remove { service, keep_data } => {
            let spec = specs
                .get(&service)
                .ok_or_else(|| AistackError::Precondition(format!("unknown service '{service}'")))?;
            Service::new(spec.clone(), &runtime).remove(keep_data)?;
            println!("removed '{service}' (keep_data={keep_data})");
        }

        Commands::Purge { remove_configs } => {
            repair::purge_all(&specs, &runtime, remove_configs)?;
            println!("purge complete (remove_configs={remove_configs})");
        }

        Commands::DiagPack { source, dest } => {
            let entries =
                diagnostics::collect_manifest(std::path::Path::new(&source), std::path::Path::new(&dest))?;
            println!("collected {} file(s) into {dest}", entries.len());
        }

        Commands::SuspendEnable => {
            let config = Config::load();
            let gpu_probe = NvidiaSmiGpuProbe;
            let controller = SuspendController::new(config.suspend.idle_timeout(), config.suspend.dry_run, &gpu_probe);
            controller.enable()?;
            println!("auto-suspend enabled");
        }

        Commands::SuspendDisable => {
            let config = Config::load();
            let gpu_probe = NvidiaSmiGpuProbe;
            let controller = SuspendController::new(config.suspend.idle_timeout(), config.suspend.dry_run, &gpu_probe);
            controller.disable()?;
            println!("auto-suspend disabled");
        }

        Commands::WolSend { mac } => {
            let mac = wol::MacAddress::parse(&mac)?;
            wol::send_magic_packet(mac)?;
            println!("magic packet sent");
        }
    }

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
