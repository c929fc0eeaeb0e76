//! Single-flight token refresh.

use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{BoxFuture, FutureExt, Shared};

use super::{AuthError, AuthResult, CredentialStore, OAuthToken, TokenRefresher};

type SharedRefresh = Shared<BoxFuture<'static, AuthResult<OAuthToken>>>;

#[derive(Default)]
struct TokenState {
    token: Option<OAuthToken>,
    in_flight: Option<(u64, SharedRefresh)>,
    generation: u64,
}

/// Keeps one provider credential valid.
///
/// Concurrent callers that find the token stale all await the same refresh;
/// the exchange is performed once and its result (success or failure) is
/// handed to every waiter.
pub struct TokenManager {
    refresher: Arc<dyn TokenRefresher>,
    store: Arc<dyn CredentialStore>,
    state: Mutex<TokenState>,
}

impl TokenManager {
    /// Build a manager seeded from `store`.
    pub fn new(
        refresher: Arc<dyn TokenRefresher>,
        store: Arc<dyn CredentialStore>,
    ) -> AuthResult<Self> {
        let token = store.load()?;
        Ok(Self {
            refresher,
            store,
            state: Mutex::new(TokenState {
                token,
                ..TokenState::default()
            }),
        })
    }

    fn lock(&self) -> AuthResult<MutexGuard<'_, TokenState>> {
        self.state
            .lock()
            .map_err(|_| AuthError::Persistence("token state lock poisoned".to_string()))
    }

    /// Whether a credential is present (it may still need a refresh).
    pub fn is_authenticated(&self) -> bool {
        self.lock()
            .map(|state| {
                state
                    .token
                    .as_ref()
                    .is_some_and(|token| !token.refresh_token.is_empty())
            })
            .unwrap_or(false)
    }

    /// Return a usable access token, refreshing it first when it is within
    /// the refresh buffer of expiry.
    pub async fn access_token(&self) -> AuthResult<String> {
        let (generation, refresh) = {
            let mut state = self.lock()?;
            let Some(token) = state.token.clone() else {
                return Err(AuthError::NotAuthenticated);
            };
            if !token.needs_refresh() {
                return Ok(token.access_token);
            }

            if let Some((generation, refresh)) = &state.in_flight {
                (*generation, refresh.clone())
            } else {
                state.generation += 1;
                let generation = state.generation;
                let refresher = Arc::clone(&self.refresher);
                let refresh_token = token.refresh_token;
                let refresh = async move { refresher.refresh(&refresh_token).await }
                    .boxed()
                    .shared();
                state.in_flight = Some((generation, refresh.clone()));
                tracing::debug!("Starting token refresh #{generation}");
                (generation, refresh)
            }
        };

        let result = refresh.await;

        let finished_here = {
            let mut state = self.lock()?;
            let owns_slot = state
                .in_flight
                .as_ref()
                .is_some_and(|(current, _)| *current == generation);
            if owns_slot {
                state.in_flight = None;
                if let Ok(token) = &result {
                    state.token = Some(token.clone());
                }
            }
            owns_slot
        };

        match result {
            Ok(token) => {
                if finished_here {
                    self.store.save(&token)?;
                }
                Ok(token.access_token)
            }
            Err(error) => {
                if finished_here {
                    tracing::warn!("Token refresh failed: {error}");
                }
                Err(error)
            }
        }
    }

    /// Forget the credential locally and in the store.
    pub fn sign_out(&self) -> AuthResult<()> {
        {
            let mut state = self.lock()?;
            state.token = None;
            state.in_flight = None;
        }
        self.store.clear()
    }
}
