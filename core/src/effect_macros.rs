//! Declarative macro for ergonomic effect construction
//!
//! Reducers build most of their effects from an async block that calls a port
//! on the environment and maps the outcome to a feedback action. `async_effect!`
//! keeps that boilerplate out of the match arms.

/// Create an `Effect::Future` from an async block
///
/// The block must evaluate to `Option<Action>`.
///
/// # Example
///
/// ```rust,ignore
/// use checkin_core::async_effect;
///
/// let backend = Arc::clone(&backend);
/// async_effect! {
///     let outcome = backend.find_by_id_or_prefix(code.clone()).await;
///     Some(GuestAction::RemoteLookupCompleted { scan_id, code, outcome })
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::Effect;

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        Looked { hits: usize },
    }

    #[test]
    fn async_effect_wraps_block() {
        let effect = async_effect! {
            Some(TestAction::Looked { hits: 1 })
        };

        let Effect::Future(fut) = effect else {
            unreachable!("async_effect! always builds a future");
        };
        assert_eq!(
            tokio_test::block_on(fut),
            Some(TestAction::Looked { hits: 1 })
        );
    }
}
