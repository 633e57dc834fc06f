use crate::app::App;
use crate::output::print_json;
use churn_core::types::User;

pub async fn login(app: &App, email: &str, password: &str, json: bool) -> anyhow::Result<()> {
    let session = app.auth.login(email, password).await?;
    if json {
        print_json(&session.user)?;
    } else {
        println!("Logged in as {}", describe(&session.user));
    }
    Ok(())
}

pub async fn logout(app: &App, json: bool) -> anyhow::Result<()> {
    let was_signed_in = app.auth.is_authenticated();
    app.auth.logout().await;
    if json {
        print_json(&serde_json::json!({ "logged_out": was_signed_in }))?;
    } else if was_signed_in {
        println!("Logged out.");
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

pub async fn whoami(app: &App, validate: bool, json: bool) -> anyhow::Result<()> {
    app.require_session()?;
    if validate && !app.auth.validate_session().await? {
        anyhow::bail!("session expired; run: churn login");
    }
    // Validation may have refreshed the user record.
    let session = app.require_session()?;
    if json {
        print_json(&session.user)?;
    } else {
        println!("{}", describe(&session.user));
    }
    Ok(())
}

fn describe(user: &User) -> String {
    format!("{} <{}> ({})", user.name, user.email, user.role)
}
