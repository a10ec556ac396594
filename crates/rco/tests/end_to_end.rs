//! Two contexts talking through directly linked sinks.

mod common;

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rco::CallPacket;
use rco::Context;
use rco::Encoding;
use rco::Function;
use rco::Packet;
use rco::Target;
use rco::Tree;
use rco::UnhandledFailure;
use rco::TARGET_NOT_FOUND;
use tokio::sync::Notify;

use common::add3;
use common::eventually;
use common::linked;

fn callback_arg(args: Vec<Tree>) -> Result<Function, Tree> {
    Tree::first(args)
        .as_function()
        .cloned()
        .ok_or_else(|| Tree::from("expected a function"))
}

#[tokio::test]
async fn test_add_coerces_like_plus_in_every_encoding() {
    for encoding in [Encoding::Raw, Encoding::Binary, Encoding::Text] {
        let (a, b) = linked(encoding);
        a.register("add", add3());

        let api = b.named_functions();
        let result = api.call("add", vec![Tree::from(1), Tree::from(2), Tree::from("3")]).await;
        assert_eq!(result, Ok(Tree::from("33")), "encoding {:?}", encoding);
    }
}

#[tokio::test]
async fn test_callback_fires_once_with_argument() {
    let (a, b) = linked(Encoding::Binary);
    a.register("relay", Function::new(|args| async move {
        let cb = callback_arg(args)?;
        cb.call(vec![Tree::from(456)]).await
    }));

    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::<Tree>::new()));
    let captured_local = 100;

    let cb = {
        let hits = hits.clone();
        let seen = seen.clone();
        Function::sync(move |args| {
            hits.fetch_add(1, Ordering::SeqCst);
            seen.lock().unwrap().extend(args);
            Ok(Tree::from(captured_local))
        })
    };

    let result = b.named_functions().call("relay", vec![Tree::Function(cb)]).await;
    assert_eq!(result, Ok(Tree::from(100)));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock().unwrap(), vec![Tree::from(456)]);
}

#[tokio::test]
async fn test_callback_entries_are_reclaimed_after_use() {
    let (a, b) = linked(Encoding::Binary);
    a.register("relay", Function::new(|args| async move {
        let cb = callback_arg(args)?;
        cb.call(vec![]).await
    }));

    let cb = Function::sync(|_| Ok(Tree::Null));
    b.named_functions().call("relay", vec![Tree::Function(cb)]).await.unwrap();

    assert!(eventually(|| a.held_count() == 0).await, "a still holds a proxy");
    assert!(eventually(|| b.entry_count() == 0).await, "b still exposes {} entries", b.entry_count());
    assert_eq!(a.entry_count(), 0);
}

#[tokio::test]
async fn test_callback_receives_a_callback() {
    let (a, b) = linked(Encoding::Binary);
    let recorded = Arc::new(Mutex::new(None));

    let sink = recorded.clone();
    a.register("nest", Function::new(move |args| {
        let sink = sink.clone();
        async move {
            let cb = callback_arg(args)?;
            let inner = Function::sync(move |args| {
                *sink.lock().unwrap() = Some(Tree::first(args));
                Ok(Tree::Null)
            });
            cb.call(vec![Tree::Function(inner)]).await
        }
    }));

    let cb = Function::new(|args| async move {
        let inner = callback_arg(args)?;
        inner.call(vec![Tree::from(456)]).await
    });

    b.named_functions().call("nest", vec![Tree::Function(cb)]).await.unwrap();
    assert_eq!(*recorded.lock().unwrap(), Some(Tree::from(456)));
}

#[tokio::test]
async fn test_async_callback_result_flows_back() {
    let (a, b) = linked(Encoding::Text);
    a.register("ask", Function::new(|args| async move {
        let cb = callback_arg(args)?;
        let answer = cb.call(vec![]).await?;
        Ok(Tree::from(answer.as_f64().unwrap_or(0.0) * 2.0))
    }));

    let cb = Function::new(|_| async { Ok(Tree::from(789)) });
    let result = b.named_functions().call("ask", vec![Tree::Function(cb)]).await;
    assert_eq!(result, Ok(Tree::from(1578)));
}

#[tokio::test]
async fn test_returned_function_is_callable() {
    let (a, b) = linked(Encoding::Binary);
    a.register("counter", Function::sync(|_| {
        let count = Arc::new(AtomicUsize::new(0));
        Ok(Tree::Function(Function::sync(move |_| {
            Ok(Tree::from((count.fetch_add(1, Ordering::SeqCst) + 1) as u32))
        })))
    }));

    let api = b.named_functions();
    let counter = api.call("counter", vec![]).await.unwrap();
    let next = counter.as_function().expect("a function came back");

    assert_eq!(next.call(vec![]).await, Ok(Tree::from(1)));
    assert_eq!(next.call(vec![]).await, Ok(Tree::from(2)));
    assert_eq!(b.held_count(), 1);
    assert_eq!(a.entry_count(), 1);

    drop(counter);
    assert!(eventually(|| a.entry_count() == 0).await, "released counter is still exposed");
}

#[tokio::test]
async fn test_thrown_value_rejects_verbatim() {
    let (a, b) = linked(Encoding::Binary);
    a.register("fails", Function::sync(|_| Err(Tree::from("boom"))));

    let result = b.named_functions().call("fails", vec![]).await;
    assert_eq!(result, Err(Tree::from("boom")));
}

#[tokio::test]
async fn test_panicking_handler_rejects_with_message() {
    let (a, b) = linked(Encoding::Binary);
    a.register("broken", Function::sync(|_| panic!("handler bug")));

    let result = tokio::time::timeout(Duration::from_secs(2), b.named_functions().call("broken", vec![]))
        .await
        .expect("reply never settled");
    let Err(Tree::Text(msg)) = result else { panic!("expected a text rejection, got {:?}", result) };
    assert!(msg.contains("handler bug"), "{}", msg);
    assert_eq!(b.entry_count(), 0);

    a.register("add", add3());
    let result = b.named_functions().call("add", vec![Tree::from(1), Tree::from(1), Tree::from(1)]).await;
    assert_eq!(result, Ok(Tree::from(3)));
}

#[tokio::test]
async fn test_missing_function_reports_not_found() {
    let (_a, b) = linked(Encoding::Binary);
    let result = b.named_functions().call("nope", vec![]).await;
    assert_eq!(result, Err(Tree::from(TARGET_NOT_FOUND)));
}

#[tokio::test]
async fn test_failure_without_channel_is_dropped() {
    common::init_tracing();
    for policy in [UnhandledFailure::Drop, UnhandledFailure::Log] {
        let a = Context::builder().name("a").failure_policy(policy).build();
        let b = Context::builder().name("b").build();
        let to_b = b.clone();
        a.bind_output(move |p| to_b.on_data(p).expect("b rejected a packet"), Encoding::Binary);
        let to_a = a.clone();
        b.bind_output(move |p| to_a.on_data(p).expect("a rejected a packet"), Encoding::Binary);

        let ran = Arc::new(Notify::new());
        let signal = ran.clone();
        a.register("fails", Function::sync(move |_| {
            signal.notify_one();
            Err(Tree::from("boom"))
        }));
        a.register("add", common::add3());

        b.emit(Packet::Call(CallPacket::notify(Target::Named("fails".into()), vec![]))).unwrap();
        ran.notified().await;

        let api = b.named_functions();
        let result = api.call("add", vec![Tree::from(1), Tree::from(2), Tree::from(3)]).await;
        assert_eq!(result, Ok(Tree::from(6)));
    }
}

#[tokio::test]
async fn test_suspended_handler_does_not_block_others() {
    let (a, b) = linked(Encoding::Binary);
    let gate = Arc::new(Notify::new());

    let wait = gate.clone();
    a.register("slow", Function::new(move |_| {
        let wait = wait.clone();
        async move {
            wait.notified().await;
            Ok(Tree::from("done"))
        }
    }));
    a.register("add", add3());

    let api = b.named_functions();
    let slow = tokio::spawn({
        let slow = api.get("slow");
        async move { slow.call(vec![]).await }
    });

    let quick = api.call("add", vec![Tree::from(2), Tree::from(2), Tree::from(2)]).await;
    assert_eq!(quick, Ok(Tree::from(6)));
    assert!(!slow.is_finished());

    gate.notify_one();
    assert_eq!(slow.await.unwrap(), Ok(Tree::from("done")));
}

#[tokio::test]
async fn test_facade_caches_bound_functions() {
    let (_a, b) = linked(Encoding::Raw);
    let api = b.named_functions();
    assert!(Function::ptr_eq(&api.get("x"), &api.get("x")));
    assert!(!Function::ptr_eq(&api.get("x"), &api.get("y")));
}

#[tokio::test]
async fn test_unbound_facade_call_rejects() {
    let ctx = Context::new();
    let result = ctx.named_functions().call("add", vec![]).await;
    let Err(Tree::Text(msg)) = result else { panic!("expected a text rejection, got {:?}", result) };
    assert!(msg.contains("not bound"));
}
