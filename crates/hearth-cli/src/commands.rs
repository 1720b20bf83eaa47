// ABOUTME: Subcommand implementations for the hearth CLI.
// ABOUTME: Each command builds a service from config, starts it, and detaches when done.

use anyhow::{Context, Result};
use futures::StreamExt;
use hearth_core::{
    Config, GameService, RunningService, SupervisorError, SupervisorEvent, SupervisorState,
};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Print the configured services.
pub fn list_services(config: &Config) -> Result<()> {
    if config.services.is_empty() {
        println!("No services configured. Run `hearth init` to create a config.");
        return Ok(());
    }
    for service in &config.services {
        println!(
            "{:<24} {:<10} {}",
            service.name,
            format!("{:?}", service.kind).to_lowercase(),
            service.definition().directory.display()
        );
    }
    Ok(())
}

/// Start a service and copy its raw console output to stdout.
pub async fn up(config: &Config, name: &str, stop_on_exit: bool) -> Result<()> {
    let service = config.service(name)?.build(&config.compose);
    let mut events = service.subscribe();

    service
        .start()
        .await
        .with_context(|| format!("Failed to start {}", name))?;
    tracing::info!(service = %name, "Relaying console output, Ctrl-C to detach");

    let mut stdout = tokio::io::stdout();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(SupervisorEvent::Output(chunk)) => {
                    stdout.write_all(&chunk).await?;
                    stdout.flush().await?;
                }
                Some(SupervisorEvent::Exited { code }) => {
                    tracing::warn!(service = %name, code = ?code, "Console exited");
                    break;
                }
                Some(_) => {}
                None => break,
            },
            _ = &mut ctrl_c => {
                tracing::info!(service = %name, "Interrupted");
                break;
            }
        }
    }

    detach(service.as_ref(), stop_on_exit).await
}

/// Start a service and run each stdin line as a console command.
pub async fn console(config: &Config, name: &str, timeout_ms: Option<u64>) -> Result<()> {
    let service = config.service(name)?.build(&config.compose);
    let mut events = service.subscribe();
    let timeout = timeout_ms.map(Duration::from_millis);

    service
        .start()
        .await
        .with_context(|| format!("Failed to start {}", name))?;

    // Lines no command claimed (chat, joins, log noise)
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                SupervisorEvent::Line(line) => println!("{line}"),
                SupervisorEvent::Exited { code } => {
                    eprintln!("console exited ({code:?})");
                    break;
                }
                _ => {}
            }
        }
    });

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    while let Some(command) = input.next_line().await? {
        let command = command.trim();
        if command.is_empty() {
            continue;
        }
        match service.run(command, timeout).await {
            Ok(Some(line)) => println!("> {line}"),
            Ok(None) => eprintln!("(no response)"),
            Err(e @ SupervisorError::AttachedExited { .. })
            | Err(e @ SupervisorError::InvalidState { .. }) => {
                tracing::warn!(error = %e, "Console is no longer usable");
                break;
            }
            Err(e) => return Err(e).context("Failed to send command"),
        }
    }

    printer.abort();
    detach(service.as_ref(), false).await
}

/// Start a game service, print its connected users, and detach.
pub async fn players(config: &Config, name: &str) -> Result<()> {
    let service_config = config.service(name)?;
    let game = service_config
        .build_game(&config.compose)
        .with_context(|| format!("Service '{}' has no connected-user query", name))?;

    game.start()
        .await
        .with_context(|| format!("Failed to start {}", name))?;
    let users = game.connected_users().await;
    println!("{}: {}", name, users);

    detach(game.as_ref(), false).await
}

async fn detach<S: RunningService + ?Sized>(service: &S, stop_container: bool) -> Result<()> {
    match service.state() {
        SupervisorState::Started { .. } | SupervisorState::Exited { .. } => service
            .shutdown(stop_container)
            .await
            .context("Failed to shut down service"),
        _ => Ok(()),
    }
}
