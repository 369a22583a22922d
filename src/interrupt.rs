// Resolves once Ctrl-C arrives. If no handler can be installed the future
// stays pending, so callers selecting on it fall through to normal flow.
pub async fn wait() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
