use exonchat::backend;
use exonchat::cli::{ActiveChoices, TerminalSink, spawn_stdin_reader};
use exonchat::config::{BackendConfig, WidgetConfig};
use exonchat::widget::{ChatWidget, UiEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout is the transcript
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let backend_config = BackendConfig::from_env()?;
    let widget_config = WidgetConfig::from_env();
    let title = widget_config
        .title
        .clone()
        .unwrap_or_else(|| "Assistant".to_string());

    eprintln!("💬 exonchat v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {} ({})", backend_config.kind, backend_config.base_url);
    eprintln!("   Type a message, or a number to pick an option. /quit to exit.\n");

    let backend = backend::connect(&backend_config)?;

    let choices = ActiveChoices::default();
    let sink = TerminalSink::new(choices.clone(), title);
    let widget = ChatWidget::new(backend, sink, widget_config);

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    tx.send(UiEvent::Open)?;
    spawn_stdin_reader(choices, tx);

    widget.run(rx).await;
    eprintln!("Goodbye.");
    Ok(())
}
