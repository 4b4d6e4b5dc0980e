//! Per-thread read/update scope tracking.
//!
//! Read closures and update closures run synchronously on the calling
//! thread, so the active scope is a thread-local.  Guards restore the
//! previous scope on drop, including during unwinding.

use std::cell::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    Idle,
    Read,
    Update,
}

thread_local! {
    static ACTIVE: Cell<Scope> = const { Cell::new(Scope::Idle) };
}

pub(crate) fn current() -> Scope {
    ACTIVE.with(Cell::get)
}

#[must_use]
pub(crate) struct ScopeGuard {
    prev: Scope,
}

impl ScopeGuard {
    pub(crate) fn enter(scope: Scope) -> Self {
        let prev = ACTIVE.with(|active| active.replace(scope));
        Self { prev }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.set(self.prev));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_nest_and_restore() {
        assert_eq!(current(), Scope::Idle);
        {
            let _update = ScopeGuard::enter(Scope::Update);
            {
                let _read = ScopeGuard::enter(Scope::Read);
                assert_eq!(current(), Scope::Read);
            }
            assert_eq!(current(), Scope::Update);
        }
        assert_eq!(current(), Scope::Idle);
    }

    #[test]
    fn guard_restores_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let _read = ScopeGuard::enter(Scope::Read);
            panic!("boom");
        });
        assert!(result.is_err());
        assert_eq!(current(), Scope::Idle);
    }
}
