use nutriscan_client::{NutritionApi, config::Config, http_client::ReqwestNutritionClient};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Example: expects NUTRISCAN_TOKEN in env
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {}", e);
            return Ok(());
        }
    };
    let Some(token) = cfg.token.clone() else {
        eprintln!("NUTRISCAN_TOKEN is not set");
        return Ok(());
    };
    let client = ReqwestNutritionClient::from_config(&cfg);
    let user = client.get_current_user(&token).await?;
    println!(
        "User: {} ({})",
        user.username,
        user.email.unwrap_or_default()
    );
    Ok(())
}
