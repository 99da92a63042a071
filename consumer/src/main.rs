use tracing::{error, info};

mod config;
mod engine;
mod sink;
mod source;
mod validator;

use config::Config;
use engine::Engine;
use sink::AnyWidgetSink;
use source::AnyRequestSource;

struct AppContext {
    config: Config,
    aws_config: aws_config::SdkConfig,
}

impl wc_app::ContextProvider<Config> for AppContext {
    async fn new(config: Config, aws_config: aws_config::SdkConfig) -> Self {
        Self { config, aws_config }
    }
}

#[tokio::main]
async fn main() {
    // Initialize the application context (which also initializes tracing)
    let context = wc_app::create_app_context::<AppContext, Config>()
        .await
        .expect("Failed to load configuration");

    let settings = match context.config.resolve() {
        Ok(settings) => settings,
        Err(err) => {
            error!("invalid configuration: {err}");
            std::process::exit(2);
        }
    };

    let source =
        AnyRequestSource::from_config(&settings.source, &context.aws_config);
    let sink = AnyWidgetSink::from_config(&settings.sink, &context.aws_config);

    info!(
        "polling {} and fulfilling requests into {}",
        settings.source, settings.sink
    );

    let report = Engine::new(
        source,
        sink,
        settings.max_idle_polls,
        settings.poll_interval,
    )
    .run()
    .await;

    info!(
        "fulfilled {} requests, skipped {}",
        report.fulfilled, report.skipped
    );
}
