use dcc_beaconing::api;
use dcc_beaconing::config::{self, Config};
use dcc_beaconing::error::AppError;
use dcc_beaconing::sim::Simulation;
use dcc_beaconing::state::{AppState, RunStatus, SimulationSnapshot};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime};
use tracing::Level;

fn init_tracing(level: Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// How the simulation thread trades simulated time against wall time.
#[derive(Debug, Clone, Copy)]
struct Pacing {
    step: Duration,
    speedup: f64,
    duration: Option<Duration>,
}

impl Pacing {
    fn from_config(config: &Config) -> Self {
        Self {
            step: config.step(),
            speedup: config.speedup(),
            duration: config.duration(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());
    let config = config::load_from_path(&config_path)?;
    init_tracing(config.log_level()?);
    tracing::info!(
        config_path = %config_path,
        app = %config.app.name,
        "dcc-beaconing starting"
    );

    let profile = config.dcc_profile()?;
    let engine_config = config.engine_config()?;
    let sim_config = config.simulation_config()?;
    tracing::info!(
        profile = profile.kind().as_str(),
        states = profile.states().len(),
        thresholds = ?profile.thresholds(),
        sampling_ms = engine_config.sampling_period.as_millis(),
        decision_ms = engine_config.decision_period.as_millis(),
        nodes = sim_config.nodes,
        "DCC profile loaded"
    );

    let mut simulation = Simulation::new(sim_config, engine_config, &profile)?;
    simulation.start()?;

    let state = Arc::new(RwLock::new(AppState::new()));
    // Held for the whole run so publishing always has a subscriber.
    let (_status_rx, _snapshot_rx) = match state.write() {
        Ok(mut guard) => {
            guard.set_profile(profile.kind().as_str());
            (guard.subscribe_status(), guard.subscribe_snapshot())
        }
        Err(_) => return Err(AppError::StateLock.into()),
    };

    let stop_flag = Arc::new(AtomicBool::new(false));
    let _simulation_handle = spawn_simulation_thread(
        simulation,
        Arc::clone(&state),
        Arc::clone(&stop_flag),
        Pacing::from_config(&config),
    );

    let app = api::router(Arc::clone(&state));
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    // Signal simulation thread to stop
    stop_flag.store(true, Ordering::Relaxed);

    Ok(())
}

fn spawn_simulation_thread(
    mut simulation: Simulation,
    state: Arc<RwLock<AppState>>,
    stop: Arc<AtomicBool>,
    pacing: Pacing,
) -> std::thread::JoinHandle<()> {
    tracing::info!(
        step_ms = pacing.step.as_millis(),
        speedup = pacing.speedup,
        "Starting simulation thread"
    );
    std::thread::spawn(move || {
        publish_status(&state, RunStatus::Running);
        while !stop.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();
            let mut target = simulation.now() + pacing.step;
            if let Some(limit) = pacing.duration {
                target = target.min(limit);
            }
            let processed = simulation.run_until(target);
            tracing::debug!(sim_time = ?target, processed, "simulation step");
            publish_snapshot(&state, &simulation);

            if pacing.duration.is_some_and(|limit| simulation.now() >= limit) {
                break;
            }
            if pacing.speedup > 0.0 {
                sleep_with_stop(pacing.step.div_f64(pacing.speedup), &stop, cycle_start);
            }
        }
        let cancelled = simulation.shutdown();
        publish_snapshot(&state, &simulation);
        publish_status(&state, RunStatus::Finished);
        tracing::info!(
            sim_time = ?simulation.now(),
            cancelled,
            "Simulation thread finished"
        );
    })
}

fn publish_snapshot(state: &Arc<RwLock<AppState>>, simulation: &Simulation) {
    let snapshot = SimulationSnapshot {
        sim_time: simulation.now(),
        channel_busy_ratio: simulation.channel_busy_ratio(),
        nodes: simulation.summaries(),
        timestamp: SystemTime::now(),
    };
    match state.write() {
        Ok(mut guard) => {
            if let Err(err) = guard.set_snapshot(snapshot) {
                tracing::warn!(error = %err, "Failed to publish simulation snapshot");
            }
        }
        Err(_) => tracing::warn!("State lock poisoned while publishing snapshot"),
    }
}

fn publish_status(state: &Arc<RwLock<AppState>>, status: RunStatus) {
    match state.write() {
        Ok(mut guard) => {
            if let Err(err) = guard.set_status(status) {
                tracing::warn!(error = %err, ?status, "Failed to publish run status");
            }
        }
        Err(_) => tracing::warn!("State lock poisoned while publishing status"),
    }
}

fn sleep_with_stop(duration: Duration, stop: &AtomicBool, start: Instant) {
    let elapsed = start.elapsed();
    if elapsed >= duration {
        return;
    }
    let remaining = duration - elapsed;
    let step = Duration::from_millis(20).min(remaining);
    let mut slept = Duration::ZERO;

    while slept < remaining {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        std::thread::sleep(step);
        slept += step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_a_running_simulation() -> Result<(), Box<dyn std::error::Error>> {
        let config = config::load_default()?;
        let profile = config.dcc_profile()?;
        let mut simulation = Simulation::new(
            config.simulation_config()?,
            config.engine_config()?,
            &profile,
        )?;
        simulation.start()?;
        simulation.run_until(Duration::from_secs(2));
        assert_eq!(
            simulation.summaries().len(),
            config.simulation_config()?.nodes as usize
        );
        Ok(())
    }

    #[test]
    fn bounded_run_finishes_and_publishes() {
        let profile = dcc_beaconing::dcc::beacon_rate::three_state(&Default::default())
            .expect("default profile");
        let engine = dcc_beaconing::engine::EngineConfig::for_profile(profile.kind());
        let mut simulation = Simulation::new(
            dcc_beaconing::sim::SimulationConfig {
                nodes: 2,
                ..Default::default()
            },
            engine,
            &profile,
        )
        .expect("simulation");
        simulation.start().expect("start");

        let state = Arc::new(RwLock::new(AppState::new()));
        let status_rx = state.read().expect("state lock").subscribe_status();
        let snapshot_rx = state.read().expect("state lock").subscribe_snapshot();
        let handle = spawn_simulation_thread(
            simulation,
            Arc::clone(&state),
            Arc::new(AtomicBool::new(false)),
            Pacing {
                step: Duration::from_millis(500),
                speedup: 0.0,
                duration: Some(Duration::from_secs(3)),
            },
        );
        handle.join().expect("simulation thread");

        assert_eq!(*status_rx.borrow(), RunStatus::Finished);
        let snapshot = snapshot_rx.borrow().clone().expect("snapshot published");
        assert_eq!(snapshot.sim_time, Duration::from_secs(3));
        assert_eq!(snapshot.nodes.len(), 2);
    }
}
