//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::time::Duration;

use rco::Context;
use rco::Encoding;
use rco::Function;
use rco::Tree;
use tracing_subscriber::EnvFilter;

/// Installs a test-writer subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Two contexts whose sinks feed each other directly.
pub fn linked(encoding: Encoding) -> (Context, Context) {
    init_tracing();
    let a = Context::builder().name("a").build();
    let b = Context::builder().name("b").build();

    let to_b = b.clone();
    a.bind_output(move |payload| to_b.on_data(payload).expect("b rejected a packet"), encoding);
    let to_a = a.clone();
    b.bind_output(move |payload| to_a.on_data(payload).expect("a rejected a packet"), encoding);

    (a, b)
}

/// `+` with string concatenation as soon as either side is not a number.
pub fn plus(lhs: &Tree, rhs: &Tree) -> Tree {
    match (lhs, rhs) {
        (Tree::Number(x), Tree::Number(y)) => Tree::Number(x + y),
        _ => Tree::Text(format!("{}{}", lhs, rhs)),
    }
}

pub fn add3() -> Function {
    Function::sync(|args| {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Tree::Null);
        Ok(plus(&plus(&arg(0), &arg(1)), &arg(2)))
    })
}

/// Polls `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
