//! Demo start-up: configuration, logging, containers and shutdown

use super::args::Args;
use super::config::{container_options, load_config};
use super::display::{print_summary, ContainerSummary, RunSummary};
use clap::Parser;
use queue_listener::core::error_handling::log_error_with_context;
use queue_listener::core::logging::init_logging;
use queue_listener::core::shutdown::ShutdownCoordinator;
use queue_listener::listener::{
    ContainerOptions, Listener, ListenerContainer, ListenerContainerRegistry, ListenerError,
};
use queue_listener::queue::{InMemoryQueue, Message};
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const DRAIN_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Run the demo, returning the process exit code
pub async fn startup() -> i32 {
    let args = Args::parse();

    let use_color = (args.color || std::io::stdout().is_terminal()) && !args.no_color;
    colored::control::set_override(use_color);

    let log_format = match args.log_format() {
        Ok(format) => format,
        Err(e) => {
            eprintln!("Invalid log format: {}", e);
            return 1;
        }
    };
    let log_file = args.log_file.as_ref().map(|p| p.to_string_lossy().to_string());
    if let Err(e) = init_logging(
        Some(&args.effective_log_level()),
        log_format,
        log_file.as_deref(),
        use_color,
    ) {
        eprintln!("Error initialising logging: {}", e);
        return 1;
    }

    let options = match load_config(args.config_file.as_deref())
        .await
        .and_then(|config| container_options(config.as_ref()))
    {
        Ok(options) => apply_overrides(options, &args),
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };
    log::debug!("Container options: {:?}", options);

    let (coordinator, mut shutdown) = ShutdownCoordinator::new();
    coordinator.install_signal_handlers();

    let registry = ListenerContainerRegistry::new();
    let mut queues = Vec::with_capacity(args.containers);
    for index in 1..=args.containers {
        let id = format!("demo-{}", index);
        let queue = Arc::new(seeded_queue(&id, &args));
        let container = ListenerContainer::builder(&id, queue.clone(), demo_listener(&args))
            .options(options.clone())
            .build()
            .and_then(|container| registry.register(container));
        if let Err(e) = container {
            log_error_with_context(&e, "Creating listener container");
            return 1;
        }
        queues.push((id, queue));
    }

    let started = Instant::now();
    if let Err(e) = registry.start_all() {
        log_error_with_context(&e, "Starting listener containers");
        registry.stop_all().await;
        return 1;
    }

    let deadline = args
        .run_for_ms
        .map(|ms| started + Duration::from_millis(ms));
    let mut check = tokio::time::interval(DRAIN_CHECK_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = check.tick() => {
                if queues.iter().all(|(_, queue)| queue.is_empty()) {
                    log::info!("All queues drained");
                    break;
                }
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    log::info!("Run time elapsed");
                    break;
                }
            }
        }
    }

    let clean_shutdown = registry.stop_all().await;
    let summary = RunSummary {
        elapsed_ms: started.elapsed().as_millis(),
        clean_shutdown,
        containers: queues
            .iter()
            .map(|(id, queue)| ContainerSummary {
                id: id.clone(),
                queue: id.clone(),
                remaining: queue.size(),
                stats: queue.stats(),
            })
            .collect(),
    };
    if let Err(e) = print_summary(&summary, &args.output) {
        log::error!("Failed to print summary: {}", e);
        return 1;
    }

    if clean_shutdown {
        0
    } else {
        1
    }
}

fn apply_overrides(mut options: ContainerOptions, args: &Args) -> ContainerOptions {
    if args.is_fifo() {
        options.fifo = true;
    }
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size;
    }
    if let Some(total_permits) = args.total_permits {
        options.total_permits = total_permits;
    }
    options
}

fn seeded_queue(name: &str, args: &Args) -> InMemoryQueue {
    let queue = if args.is_fifo() {
        InMemoryQueue::fifo(name)
    } else {
        InMemoryQueue::new(name)
    }
    .with_visibility_timeout(Duration::from_millis(args.visibility_timeout_ms))
    .with_max_size(args.messages.max(1));

    let groups = args.groups.unwrap_or(1).max(1);
    for index in 0..args.messages {
        let group = format!("group-{}", index % groups);
        let group = args.is_fifo().then_some(group.as_str());
        if let Err(e) = queue.send(format!("message {}", index), group) {
            log::warn!("[{}] Could not seed message {}: {}", name, index, e);
        }
    }
    queue
}

fn demo_listener(args: &Args) -> Listener {
    let work = Duration::from_millis(args.work_ms);
    let fail_every = args.fail_every.filter(|n| *n > 0);
    Listener::single(move |message: Arc<Message>| async move {
        tokio::time::sleep(work).await;
        let fail = fail_every
            .is_some_and(|n| message.header.sequence % n as u64 == 0)
            && message.header.receive_count == 1;
        if fail {
            return Err(ListenerError::failed(format!(
                "simulated failure for {}",
                message.id()
            )));
        }
        log::trace!("Handled {}: {}", message.id(), message.data);
        Ok(())
    })
}
