use std::{error::Error as StdError, path::PathBuf, time::Duration};

use anyhow::Result;
use armsync::{
    local_trajectory, render_frame, JointSpecs, JointStateStore, RenderFrame, SyncEngine,
    SyncHandle, SyncSnapshot,
};
use armsync_apps::{
    utils::{get_apps_config_path, init_tracing, resolve_config},
    ArmSyncConfig,
};
use clap::{Parser, Subcommand};
use schemars::schema_for;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

fn parse_joints<T, U>(s: &str) -> Result<(T, U), Box<dyn StdError + Send + Sync + 'static>>
where
    T: std::str::FromStr,
    T::Err: StdError + Send + Sync + 'static,
    U: std::str::FromStr,
    U::Err: StdError + Send + Sync + 'static,
{
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{s}`"))?;
    Ok((s[..pos].parse()?, s[pos + 1..].parse()?))
}

/// Steer a robot arm through its remote authority.
#[derive(Parser, Debug)]
#[clap(name = env!("CARGO_BIN_NAME"))]
struct Args {
    /// Path to the setting file.
    #[clap(short, long, value_parser)]
    config_path: Option<PathBuf>,
    /// Authority endpoint. Takes priority over the setting file.
    #[clap(long)]
    endpoint: Option<Url>,
    /// How long to wait for the authority before falling back to local
    /// interpolation.
    #[clap(long, default_value_t = 2000)]
    wait_open_ms: u64,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set joint targets (degrees) and move there.
    Move {
        #[clap(short, value_parser = parse_joints::<usize, f64>)]
        joint: Vec<(usize, f64)>,
        /// Print the local interpolation steps without connecting.
        #[clap(long)]
        dry_run: bool,
    },
    /// Move every joint back to zero.
    Reset,
    /// Print the state reported by the authority.
    State,
    /// Log snapshots until Ctrl-C.
    Watch {
        #[clap(long, default_value_t = 500)]
        interval_ms: u64,
    },
    /// Print the joint table.
    Joints,
    /// Print the default setting as TOML.
    ShowDefaultConfig,
    /// Print the JSON schema of the setting file.
    Schema,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    snapshot: &'a SyncSnapshot,
    frame: RenderFrame,
}

fn print_report(config: &ArmSyncConfig, specs: &JointSpecs, snapshot: &SyncSnapshot) -> Result<()> {
    let frame = render_frame(config.render_shape, specs, &snapshot.current, config.placement)?;
    let report = Report { snapshot, frame };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_joints(specs: &JointSpecs) {
    println!("index\tname\tmin_deg\tmax_deg\taxis\tlink_length");
    for spec in specs.iter() {
        println!(
            "{}\t{}\t{}\t{}\t{:?}\t{}",
            spec.index, spec.name, spec.min_deg, spec.max_deg, spec.axis, spec.link_length
        );
    }
}

fn dry_run(config: &ArmSyncConfig, specs: JointSpecs, joint: &[(usize, f64)]) -> Result<()> {
    let mut store = JointStateStore::new(specs);
    for &(index, value) in joint {
        store.set_target(index, value)?;
    }
    for point in local_trajectory(store.current(), store.target(), config.interpolation_steps) {
        println!("{}", serde_json::to_string(&point)?);
    }
    Ok(())
}

async fn watch(
    handle: &SyncHandle,
    config: &ArmSyncConfig,
    specs: &JointSpecs,
    interval: Duration,
) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = handle.snapshot()?;
                let frame = render_frame(config.render_shape, specs, &snapshot.current, config.placement)?;
                info!(
                    connection = ?snapshot.connection,
                    motion = ?snapshot.motion,
                    current = ?snapshot.current,
                    target = ?snapshot.target,
                    frame = %serde_json::to_string(&frame)?,
                    "snapshot"
                );
            }
            res = tokio::signal::ctrl_c() => {
                res?;
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    debug!(?args, "parsed args");

    let config_path = get_apps_config_path(args.config_path);
    let mut config = resolve_config(config_path.as_deref())?;
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    let specs = config.joint_specs()?;

    match &args.command {
        Command::ShowDefaultConfig => {
            print!("{}", toml::to_string(&ArmSyncConfig::default())?);
            return Ok(());
        }
        Command::Schema => {
            let schema = schema_for!(ArmSyncConfig);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            return Ok(());
        }
        Command::Joints => {
            print_joints(&specs);
            return Ok(());
        }
        Command::Move {
            joint,
            dry_run: true,
        } => return dry_run(&config, specs, joint),
        _ => {}
    }

    let (handle, task) =
        SyncEngine::new(specs.clone(), config.transport(), config.sync_options()).spawn();
    let wait_open = Duration::from_millis(args.wait_open_ms);
    if !handle.wait_until_open(wait_open).await? {
        warn!(endpoint = %config.endpoint, "authority is not reachable");
    }

    match args.command {
        Command::Move { joint, .. } => {
            for (index, value) in joint {
                let clamped = handle.set_target(index, value).await?;
                if clamped != value {
                    warn!(index, value, clamped, "target clamped to joint limit");
                }
            }
            let outcome = handle.move_to_target().await?;
            info!(?outcome, "moving");
            let snapshot = handle.wait_until_idle().await?;
            print_report(&config, &specs, &snapshot)?;
        }
        Command::Reset => {
            let outcome = handle.reset_to_home().await?;
            info!(?outcome, "moving home");
            let snapshot = handle.wait_until_idle().await?;
            print_report(&config, &specs, &snapshot)?;
        }
        Command::State => {
            let snapshot =
                match tokio::time::timeout(wait_open, handle.wait_for(|s| s.authority_updates > 0))
                    .await
                {
                    Ok(snapshot) => snapshot?,
                    Err(_) => {
                        warn!("no state received from the authority");
                        handle.snapshot()?
                    }
                };
            print_report(&config, &specs, &snapshot)?;
        }
        Command::Watch { interval_ms } => {
            watch(&handle, &config, &specs, Duration::from_millis(interval_ms)).await?;
        }
        Command::Joints | Command::ShowDefaultConfig | Command::Schema => unreachable!(),
    }

    handle.shutdown().await?;
    task.await?;
    Ok(())
}
