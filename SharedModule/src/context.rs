//! # Log Scope
//!
//! Each role's loop enters a thread-local log scope at the start of an
//! iteration so that messages from shared code can be told apart when
//! several roles share one process. The previous scope is restored when the
//! guard drops, which lets an in-loop simulator nest inside the frontend.

use std::cell::RefCell;

thread_local! {
    static LOG_SCOPE: RefCell<Vec<&'static str>> = RefCell::new(Vec::new());
}

/// Restores the previous log scope when dropped
#[derive(Debug)]
#[must_use = "the scope is left as soon as the guard is dropped"]
pub struct LogScopeGuard {
    depth: usize,
}

/// Enter a log scope for the current thread
pub fn enter(scope: &'static str) -> LogScopeGuard {
    LOG_SCOPE.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.push(scope);
        LogScopeGuard { depth: stack.len() }
    })
}

impl Drop for LogScopeGuard {
    fn drop(&mut self) {
        LOG_SCOPE.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.truncate(self.depth.saturating_sub(1));
        });
    }
}

/// Name of the innermost scope, or "-" outside of any loop
pub fn current_scope() -> &'static str {
    LOG_SCOPE.with(|stack| stack.borrow().last().copied().unwrap_or("-"))
}

/// Log through the `log` facade with the current scope as prefix
#[macro_export]
macro_rules! scoped_log {
    ($lvl:expr, $($arg:tt)+) => {
        log::log!($lvl, "[{}] {}", $crate::context::current_scope(), format_args!($($arg)+))
    };
}
