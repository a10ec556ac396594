//! rco demo
//!
//! Two contexts share a duplex channel. The "host" side registers a few named functions;
//! the "guest" side calls them, passing callbacks along the way.
//!
//! Usage:
//!   cargo run -p rco-demo
//!   RUST_LOG=rco=debug cargo run -p rco-demo

use std::time::Duration;

use anyhow::Context as _;
use anyhow::anyhow;
use rco::Context;
use rco::DuplexChannelTransport;
use rco::Function;
use rco::Tree;
use rco::UnhandledFailure;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn plus(lhs: &Tree, rhs: &Tree) -> Tree {
    match (lhs, rhs) {
        (Tree::Number(x), Tree::Number(y)) => Tree::Number(x + y),
        _ => Tree::Text(format!("{}{}", lhs, rhs)),
    }
}

fn host_functions(host: &Context) {
    host.register_all([
        ("add", Function::sync(|args| {
            Ok(args.iter().skip(1).fold(args.first().cloned().unwrap_or(Tree::Null), |acc, x| plus(&acc, x)))
        })),
        ("relay", Function::new(|args| async move {
            let cb = Tree::first(args).as_function().cloned().ok_or_else(|| Tree::from("relay needs a callback"))?;
            cb.call(vec![Tree::from(456)]).await
        })),
        ("fails", Function::sync(|_| Err(Tree::from("boom")))),
        ("counter", Function::sync(|_| {
            let count = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
            Ok(Tree::Function(Function::sync(move |_| {
                Ok(Tree::from(count.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1))
            })))
        })),
    ]);
}

async fn call(guest: &Context, name: &str, args: Vec<Tree>) -> anyhow::Result<Tree> {
    guest
        .named_functions()
        .call(name, args)
        .await
        .map_err(|thrown| anyhow!("{} threw {}", name, thrown))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rco=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (host_transport, guest_transport) = DuplexChannelTransport::pair();

    let host = Context::builder().name("host").failure_policy(UnhandledFailure::Log).build();
    host_functions(&host);
    let guest = Context::builder().name("guest").build();

    let host_pump = host.serve(host_transport);
    let guest_pump = guest.serve(guest_transport);

    let sum = call(&guest, "add", vec![Tree::from(1), Tree::from(2), Tree::from("3")]).await?;
    info!(%sum, "add(1, 2, \"3\")");

    let local = 100;
    let cb = Function::sync(move |args| {
        info!(arg = %Tree::first(args), local, "callback fired");
        Ok(Tree::from(local))
    });
    let relayed = call(&guest, "relay", vec![Tree::Function(cb)]).await?;
    info!(%relayed, "relay(cb)");

    match call(&guest, "fails", vec![]).await {
        Ok(v) => return Err(anyhow!("fails() unexpectedly returned {}", v)),
        Err(e) => info!(error = %e, "fails()"),
    }

    let counter = call(&guest, "counter", vec![]).await?;
    let next = counter.as_function().context("counter() did not return a function")?;
    for _ in 0..3 {
        let n = next.call(vec![]).await.map_err(|e| anyhow!("counter threw {}", e))?;
        info!(%n, "counter()");
    }
    drop(counter);

    tokio::time::sleep(Duration::from_millis(50)).await;
    info!(
        host_entries = host.entry_count(),
        guest_entries = guest.entry_count(),
        guest_held = guest.held_count(),
        "after reclaim"
    );

    guest_pump.abort();
    host_pump.closed().await;
    Ok(())
}
