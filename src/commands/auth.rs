//! Session command handlers.
//!
//! - `expense-sync login` exchanges credentials for a token and stores the user locally
//! - `expense-sync logout` ends the session on the server and clears it locally

use crate::api::{self, Credentials, Mode, Remote};
use crate::args::LoginArgs;
use crate::commands::Out;
use crate::model::{StateAction, User};
use crate::{Config, Result};
use std::sync::Arc;
use tracing::warn;

/// Logs in, fetches the user and records the session in the app state.
///
/// # Errors
/// - Returns the server's error if the credentials are rejected or the server is unreachable.
pub async fn login(config: Config, mode: Mode, args: LoginArgs) -> Result<Out<User>> {
    let remote = api::remote(&config, mode, None)?;
    login_with(&config, remote.as_ref(), args).await
}

async fn login_with(config: &Config, remote: &dyn Remote, args: LoginArgs) -> Result<Out<User>> {
    let token = remote
        .login(&Credentials {
            email: args.email,
            password: args.password,
        })
        .await?;
    remote.set_access_token(Some(token.access_token.clone()));
    let user = remote.get_user().await?;

    let db = config.db();
    db.save_user(&user).await?;
    db.dispatch(StateAction::LoggedIn {
        access_token: token.access_token,
        user_id: Some(user.id.clone()),
    })
    .await?;
    Ok(Out::new(
        format!("Logged in as {} {}", user.first_name, user.last_name),
        user,
    ))
}

/// Ends the session. The local session is cleared even when the server cannot be told.
pub async fn logout(config: Config, mode: Mode) -> Result<Out<()>> {
    let state = config.db().app_state().await?;
    if !state.is_authenticated {
        return Ok("Not logged in".into());
    }
    let remote = api::remote(&config, mode, state.access_token)?;
    logout_with(&config, remote).await
}

async fn logout_with(config: &Config, remote: Arc<dyn Remote>) -> Result<Out<()>> {
    if let Err(e) = remote.logout().await {
        warn!("The server did not acknowledge the logout: {e}");
    }
    remote.set_access_token(None);
    let db = config.db();
    db.dispatch(StateAction::LoggedOut).await?;
    db.clear_user().await?;
    Ok("Logged out".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{TestRemote, TEST_EMAIL, TEST_PASSWORD};
    use crate::test::TestEnv;

    fn credentials(password: &str) -> LoginArgs {
        LoginArgs {
            email: TEST_EMAIL.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_then_logout() {
        let env = TestEnv::new().await;
        let remote = TestRemote::new();
        let out = login_with(&env.config(), &remote, credentials(TEST_PASSWORD))
            .await
            .unwrap();
        assert_eq!(out.structure().unwrap().email, TEST_EMAIL);

        let state = env.db().app_state().await.unwrap();
        assert!(state.is_authenticated);
        assert!(state.access_token.is_some());
        assert!(env.db().current_user().await.unwrap().is_some());

        logout_with(&env.config(), Arc::new(remote.clone()))
            .await
            .unwrap();
        assert!(!env.db().app_state().await.unwrap().is_authenticated);
        assert!(env.db().current_user().await.unwrap().is_none());
        assert_eq!(remote.calls(), vec!["login", "get_user", "logout"]);
    }

    #[tokio::test]
    async fn test_bad_password_changes_nothing() {
        let env = TestEnv::new().await;
        let remote = TestRemote::new();
        let err = login_with(&env.config(), &remote, credentials("nope"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(!env.db().app_state().await.unwrap().is_authenticated);
    }
}
