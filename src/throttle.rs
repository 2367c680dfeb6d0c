use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

pub type RefreshFn = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Default)]
struct ThrottleState {
    // latest refresh asked for, replaces any earlier one in the window
    pending: Option<RefreshFn>,
    // a timer task is alive (waiting or running a refresh)
    armed: bool,
    merged: u64,
}

// Trailing-window coalescing: many calls inside one window run once, at the
// end of the window, and a refresh never overlaps another.
#[derive(Clone)]
pub struct RefreshThrottle {
    window: Duration,
    state: Arc<Mutex<ThrottleState>>,
}

impl RefreshThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Arc::new(Mutex::new(ThrottleState::default())),
        }
    }

    pub fn call(&self, refresh: RefreshFn) {
        let spawn_timer = {
            let mut state = lock(&self.state);
            if state.pending.is_some() {
                state.merged += 1;
            }
            state.pending = Some(refresh);
            if state.armed {
                false
            } else {
                state.armed = true;
                true
            }
        };

        if spawn_timer {
            let window = self.window;
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(window).await;

                    let refresh = {
                        let mut guard = lock(&state);
                        match guard.pending.take() {
                            Some(refresh) => {
                                debug!(merged = guard.merged, "running coalesced refresh");
                                guard.merged = 0;
                                refresh
                            }
                            None => {
                                guard.armed = false;
                                break;
                            }
                        }
                    };
                    refresh().await;

                    // calls that arrived while running get their own trailing window
                    let idle = {
                        let mut guard = lock(&state);
                        if guard.pending.is_none() {
                            guard.armed = false;
                        }
                        !guard.armed
                    };
                    if idle {
                        break;
                    }
                }
            });
        }
    }
}

fn lock(state: &Mutex<ThrottleState>) -> MutexGuard<'_, ThrottleState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
