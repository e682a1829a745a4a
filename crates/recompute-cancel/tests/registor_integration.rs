//! Integration tests composing promises, tokens and registrars the way an
//! interactive command does.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use recompute_cancel::{
    Cancellable, CancellablePromise, CancellableRegistor, Cancellation, PromiseError,
    PromiseHooks, PromiseState, RegistorState,
};

struct Panicking;

impl Cancellable for Panicking {
    fn cancel(&self) {
        panic!("cancel exploded");
    }

    fn finish(&self) {
        panic!("finish exploded");
    }
}

#[derive(Default)]
struct Counting {
    cancels: AtomicUsize,
    finishes: AtomicUsize,
}

impl Cancellable for Counting {
    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.finishes.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn panicking_resource_does_not_block_the_rest() {
    let registor = CancellableRegistor::new();
    let before = registor.register(Arc::new(Counting::default()));
    registor.register(Arc::new(Panicking));
    let after = registor.register(Arc::new(Counting::default()));

    registor.cancel();

    assert_eq!(before.cancels.load(Ordering::SeqCst), 1);
    assert_eq!(after.cancels.load(Ordering::SeqCst), 1);
    assert_eq!(registor.state(), RegistorState::Cancelled);
}

#[test]
fn finishing_registor_resolves_registered_gesture() {
    let registor = CancellableRegistor::new();
    let gesture = CancellablePromise::new(|resolver| {
        let on_cancel = resolver.clone();
        PromiseHooks::new()
            .on_cancel(move || {
                on_cancel.reject("gesture aborted");
            })
            .on_finish(move || {
                resolver.resolve(42.0_f64);
            })
    });
    registor.register(Arc::new(gesture.handle()));
    let token = registor.register(Arc::new(Cancellation::new()));

    registor.finish();
    registor.finish();

    assert_eq!(gesture.state(), PromiseState::Finished);
    assert!(!token.is_cancelled());
    assert_eq!(pollster::block_on(gesture), Ok(42.0));
}

#[test]
fn cancelling_registor_rejects_gesture_and_trips_token() {
    let registor = CancellableRegistor::new();
    let gesture = CancellablePromise::<f64>::new(|resolver| {
        PromiseHooks::new().on_cancel(move || {
            resolver.reject("gesture aborted");
        })
    });
    registor.register(Arc::new(gesture.handle()));
    let token = registor.register(Arc::new(Cancellation::new()));

    registor.cancel();

    assert!(token.is_cancelled());
    assert_eq!(
        pollster::block_on(gesture),
        Err(PromiseError::Rejected("gesture aborted".to_string()))
    );
}

#[test]
fn resource_may_register_while_terminating() {
    struct Spawner {
        registor: Arc<CancellableRegistor>,
        spawned: Arc<Counting>,
    }

    impl Cancellable for Spawner {
        fn cancel(&self) {
            self.registor.register(self.spawned.clone());
        }

        fn finish(&self) {}
    }

    let registor = Arc::new(CancellableRegistor::new());
    let spawned = Arc::new(Counting::default());
    registor.register(Arc::new(Spawner {
        registor: registor.clone(),
        spawned: spawned.clone(),
    }));

    registor.cancel();

    assert_eq!(spawned.cancels.load(Ordering::SeqCst), 1);
}
