//! FIFO connection lock.
//!
//! A physical connection must not have two frame reads interleaved: a frame
//! header followed by its body from different logical operations would corrupt
//! both. [`ConnectionLock`] serializes access to the protected half of a
//! connection with strict FIFO fairness (enqueue order is grant order), so
//! many concurrent callers awaiting one connection cannot starve each other.
//!
//! The protected value travels inside the guard. On release the next waiter
//! receives a ready-made guard through its wake-up channel; if that waiter was
//! cancelled in the meantime, the undelivered guard drops, which releases
//! again and moves on to the next waiter. Release therefore happens exactly
//! once on every exit path, including cancellation racing a grant.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

struct LockState<T> {
    /// The protected value while nobody holds the lock.
    available: Option<T>,
    /// Pending acquirers in arrival order.
    waiters: VecDeque<oneshot::Sender<LockGuard<T>>>,
}

/// Fair async lock over the value it protects.
pub struct ConnectionLock<T> {
    state: Arc<Mutex<LockState<T>>>,
}

impl<T> ConnectionLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: Arc::new(Mutex::new(LockState {
                available: Some(value),
                waiters: VecDeque::new(),
            })),
        }
    }

    /// Suspend until this caller is the sole holder. Grants are strictly FIFO
    /// by enqueue order. Dropping the returned future before the grant simply
    /// removes this caller from consideration; other waiters are undisturbed.
    pub async fn acquire(&self) -> LockGuard<T> {
        let receiver = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(value) = state.available.take() {
                return LockGuard {
                    state: Arc::clone(&self.state),
                    value: Some(value),
                };
            }
            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(sender);
            receiver
        };

        // The sender lives in the waiter queue until a release hands it a
        // guard; it is only dropped with the guard attached, so a bare recv
        // error cannot happen while this future is being polled.
        receiver
            .await
            .unwrap_or_else(|_| unreachable!("lock waiter dropped without a grant"))
    }

    /// True while some caller holds the lock.
    pub fn is_locked(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .available
            .is_none()
    }

    /// Number of callers waiting for a grant.
    pub fn waiters(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .waiters
            .len()
    }
}

/// Scoped guard: sole access to the protected value, released on drop.
pub struct LockGuard<T> {
    state: Arc<Mutex<LockState<T>>>,
    value: Option<T>,
}

impl<T> LockGuard<T> {
    fn release(state: &Arc<Mutex<LockState<T>>>, mut value: T) {
        loop {
            let sender = {
                let mut locked = state.lock().unwrap_or_else(PoisonError::into_inner);
                match locked.waiters.pop_front() {
                    Some(sender) => sender,
                    None => {
                        locked.available = Some(value);
                        return;
                    }
                }
            };
            let guard = LockGuard {
                state: Arc::clone(state),
                value: Some(value),
            };
            match sender.send(guard) {
                Ok(()) => return,
                // Waiter cancelled between enqueue and grant: reclaim the
                // value and hand it to the next one.
                Err(mut unclaimed) => match unclaimed.value.take() {
                    Some(reclaimed) => value = reclaimed,
                    None => return,
                },
            }
        }
    }
}

impl<T> Deref for LockGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
            .as_ref()
            .unwrap_or_else(|| unreachable!("guard value taken before drop"))
    }
}

impl<T> DerefMut for LockGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
            .as_mut()
            .unwrap_or_else(|| unreachable!("guard value taken before drop"))
    }
}

impl<T> Drop for LockGuard<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            Self::release(&self.state, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tokio::sync::mpsc;

    #[tokio::test(flavor = "current_thread")]
    async fn grants_follow_enqueue_order() {
        let lock = Arc::new(ConnectionLock::new(0u32));
        let (order_tx, mut order_rx) = mpsc::unbounded_channel();

        let holder = lock.acquire().await;

        for name in ["A", "B", "C"] {
            let lock = Arc::clone(&lock);
            let order_tx = order_tx.clone();
            tokio::spawn(async move {
                let _guard = lock.acquire().await;
                order_tx.send(name).unwrap();
            });
            // Let the task reach its await point so it enqueues now.
            tokio::task::yield_now().await;
        }
        assert_eq!(lock.waiters(), 3);

        drop(holder);
        assert_eq!(order_rx.recv().await, Some("A"));
        assert_eq!(order_rx.recv().await, Some("B"));
        assert_eq!(order_rx.recv().await, Some("C"));
        assert!(!lock.is_locked());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cancelled_waiter_is_skipped() {
        let lock = Arc::new(ConnectionLock::new(()));
        let holder = lock.acquire().await;

        // Enqueue and immediately cancel a waiter.
        let cancelled = lock.acquire().now_or_never();
        assert!(cancelled.is_none());
        assert_eq!(lock.waiters(), 1);

        let survivor = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                let _guard = lock.acquire().await;
                "granted"
            })
        };
        tokio::task::yield_now().await;

        drop(holder);
        assert_eq!(survivor.await.unwrap(), "granted");
        assert!(!lock.is_locked());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn release_happens_on_error_paths() {
        let lock = ConnectionLock::new(5u32);

        let result: Result<(), &str> = async {
            let guard = lock.acquire().await;
            assert_eq!(*guard, 5);
            Err("boom")
        }
        .await;

        assert!(result.is_err());
        assert!(!lock.is_locked());
        let mut guard = lock.acquire().await;
        *guard += 1;
        drop(guard);
        assert_eq!(*lock.acquire().await, 6);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn uncontended_fast_path() {
        let lock = ConnectionLock::new(String::from("conn"));
        {
            let guard = lock.acquire().await;
            assert_eq!(&*guard, "conn");
            assert!(lock.is_locked());
            assert_eq!(lock.waiters(), 0);
        }
        assert!(!lock.is_locked());
    }
}
