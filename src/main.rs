use agency_dashboard::bootstrapper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment may already be set
    dotenvy::dotenv().ok();

    bootstrapper::run().await
}
