use vaultstrap::error::StageError;

#[tokio::main]
async fn main() {
    if let Err(e) = vaultstrap::run().await {
        tracing::error!("{e:#}");
        // distinct exit code per failing stage; 1 for anything else
        let code = e
            .downcast_ref::<StageError>()
            .map(|stage_error| stage_error.stage.exit_code())
            .unwrap_or(1);
        std::process::exit(code);
    }
}
