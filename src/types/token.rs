/// The single cooperative stop signal of a migration run.
///
/// Alias for [`tokio_util::sync::CancellationToken`]. Create it once, pass a
/// clone to [`MigrationPipeline::new`](crate::MigrationPipeline::new) and call
/// [`cancel()`](tokio_util::sync::CancellationToken::cancel) to stop admitting
/// new objects. Work already read keeps flowing until it is written and
/// deleted.
pub type PipelineCancellationToken = tokio_util::sync::CancellationToken;

/// Create a new [`PipelineCancellationToken`].
///
/// # Example
///
/// ```
/// use s3mv_rs::create_pipeline_cancellation_token;
///
/// let token = create_pipeline_cancellation_token();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
pub fn create_pipeline_cancellation_token() -> PipelineCancellationToken {
    tokio_util::sync::CancellationToken::new()
}
