//! Run command - drive the cycle engine against a seeded in-memory world.

use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use drillcycle::model::{Drill, DrillId, Operator, OperatorId, Pool, PoolId, RewardSplit};
use drillcycle::notify::{ChannelNotifier, Notification};
use drillcycle::service::{Collaborators, CycleService};
use drillcycle::store::{MemoryCounters, MemoryReserve, MemoryStore};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Operators per demo pool; the first member leads.
const POOL_SIZE: u64 = 4;

/// Arguments for the run command.
#[derive(Debug, Default)]
pub struct RunArgs {
    pub config: Option<PathBuf>,
    /// Stop after this many cycle boundaries
    pub cycles: Option<u64>,
    /// Override the cycle duration
    pub interval_secs: Option<u64>,
    /// Number of demo operators
    pub operators: u64,
    /// Seed for the demo world
    pub seed: Option<u64>,
    /// Start counting from this cycle number (admin)
    pub reset_counter: Option<u64>,
    pub admin_secret: Option<String>,
}

/// Shape of the generated world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldSummary {
    pub operators: u64,
    pub drills: u64,
    pub pools: u64,
}

/// Populates `store` with operators, drills and pools.
///
/// Every operator gets one to three drills. About two thirds of the drills
/// are extractor-eligible. Every third group of [`POOL_SIZE`] operators
/// forms a pool.
pub fn seed_world(store: &MemoryStore, operators: u64, seed: Option<u64>) -> WorldSummary {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut drills = 0u64;
    let mut pools = 0u64;

    for id in 1..=operators {
        let operator = OperatorId(id);
        let max_fuel = rng.gen_range(50.0..150.0);
        store.upsert_operator(Operator::new(operator, format!("operator-{id}"), max_fuel));

        for _ in 0..rng.gen_range(1..=3) {
            drills += 1;
            store.upsert_drill(Drill {
                id: DrillId(drills),
                owner_operator_id: operator,
                efficiency_rating: rng.gen_range(10.0..100.0),
                extractor_eligible: rng.gen_bool(0.66),
                active: true,
            });
        }
        store.refresh_efficiency(operator, 1.0);
    }

    let mut start = 1;
    while start + POOL_SIZE - 1 <= operators {
        if (start / POOL_SIZE) % 3 == 0 {
            pools += 1;
            let pool = PoolId(pools);
            store.insert_pool(Pool {
                id: pool,
                leader_operator_id: Some(OperatorId(start)),
                reward_split: RewardSplit::new(0.3, 0.1, 0.55),
            });
            for member in start..start + POOL_SIZE {
                store.join_pool(OperatorId(member), pool);
            }
        }
        start += POOL_SIZE;
    }

    WorldSummary {
        operators,
        drills,
        pools,
    }
}

/// Run the run command.
pub fn run(args: RunArgs) -> Result<(), CliError> {
    let mut runner = CliRunner::new(args.config.as_deref())?;
    runner.log_startup("run");
    if let Some(secs) = args.interval_secs {
        runner.config_mut().cycle.duration_secs = secs;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    runtime.block_on(run_engine(&runner, &args))
}

async fn run_engine(runner: &CliRunner, args: &RunArgs) -> Result<(), CliError> {
    let store = Arc::new(MemoryStore::new());
    let counters = Arc::new(MemoryCounters::new());
    let reserve = Arc::new(MemoryReserve::new());
    let (notifier, notifications) = ChannelNotifier::channel();

    let world = seed_world(&store, args.operators, args.seed);
    info!(
        operators = world.operators,
        drills = world.drills,
        pools = world.pools,
        "Demo world seeded"
    );

    let collaborators = Collaborators {
        store: store.clone(),
        counters,
        reserve: reserve.clone(),
        notifier: Arc::new(notifier),
    };
    let service =
        CycleService::new(runner.config(), collaborators).map_err(CliError::ServiceCreation)?;

    if let Some(value) = args.reset_counter {
        let secret = args.admin_secret.as_deref().unwrap_or("");
        service.reset_counter(secret, value).await?;
        println!("Cycle counter reset to {}", value);
    }

    let mut started = 0;
    for id in 1..=world.operators {
        match service.create_session(OperatorId(id)).await {
            Ok(_) => started += 1,
            Err(e) => warn!(operator = id, error = %e, "Demo session not started"),
        }
    }

    let shutdown = service.shutdown_token();
    ctrlc::set_handler(move || shutdown.cancel())
        .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let printer = tokio::spawn(print_notifications(notifications));

    println!(
        "Running {} operators ({} drills, {} pools, {} sessions), {}s cycles{}",
        world.operators,
        world.drills,
        world.pools,
        started,
        runner.config().cycle.duration_secs,
        match args.cycles {
            Some(n) => format!(", stopping after {} cycles", n),
            None => ", Ctrl+C to stop".to_string(),
        }
    );
    println!();

    service.run(args.cycles).await.map_err(CliError::Engine)?;

    // Dropping the service closes the notification channel.
    let status = service.cycle_status();
    drop(service);
    if let Err(e) = printer.await {
        debug!(error = %e, "Notification printer ended abnormally");
    }

    println!();
    println!("{}", status.cycle_line());
    println!("{}", status.finalized_line());
    println!("Reserve balance: {:.4}", reserve.balance());
    print_top_earners(&store, 5);
    Ok(())
}

async fn print_notifications(mut rx: mpsc::UnboundedReceiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        println!(
            "  [{}] {} operator(s) {}",
            notification.kind.as_str(),
            notification.operator_ids.len(),
            notification.payload
        );
    }
}

fn print_top_earners(store: &MemoryStore, limit: usize) {
    let mut operators = store.operators();
    operators.sort_by(|a, b| b.total_earned_reward.total_cmp(&a.total_earned_reward));

    println!("Top earners (closed sessions and idle credits):");
    for op in operators.iter().take(limit) {
        println!(
            "  {:<16} {:>12.4}  fuel {:>6.1}/{:<6.1}",
            op.display_name, op.total_earned_reward, op.current_fuel, op.max_fuel
        );
    }
}
