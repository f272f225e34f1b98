//! Authentication state trait and macro.

use crate::provider::IdentityProvider;

/// Trait for state types that can resolve sessions.
pub trait HasSessionBackend {
    fn provider(&self) -> &dyn IdentityProvider;
    /// Whether session cookies get the `Secure` attribute.
    fn secure_cookies(&self) -> bool;
}

/// Macro to implement `HasSessionBackend` for state structs with the standard fields.
///
/// The struct must have these fields:
/// - `provider: Arc<dyn IdentityProvider>`
/// - `secure_cookies: bool`
///
/// # Example
/// ```ignore
/// use crate::impl_has_session_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub provider: Arc<dyn IdentityProvider>,
///     pub secure_cookies: bool,
/// }
///
/// impl_has_session_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_session_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasSessionBackend for $state_type {
            fn provider(&self) -> &dyn $crate::provider::IdentityProvider {
                self.provider.as_ref()
            }
            fn secure_cookies(&self) -> bool {
                self.secure_cookies
            }
        }
    };
}
