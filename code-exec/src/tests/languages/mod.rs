use super::utils::{defaults::*, execute_or_skip};
use crate::{
    languages::skip_if_not_available,
    result::{MEMORY_LIMIT_MESSAGE, TIME_LIMIT_MESSAGE},
    CodeExecutionService, EngineState, ExecutionResult, Language, Result,
};
use tokio::time::Duration;

pub mod javascript;
pub mod python;
pub mod typescript;

fn tool_for(language: Language) -> &'static str {
    match language {
        Language::Python => "python3",
        Language::JavaScript | Language::TypeScript => "node",
    }
}

/// Fresh service plus an execution, or `None` when the interpreter is unavailable.
async fn run(
    language: Language,
    code: &str,
    timeout: Duration,
    memory_limit_mb: f64,
) -> Result<Option<ExecutionResult>> {
    if skip_if_not_available(&[tool_for(language)]) {
        return Ok(None);
    }
    let service = test_service().await?;
    let request = request(language, code)
        .with_timeout(timeout)
        .with_memory_limit_mb(memory_limit_mb);
    let result = execute_or_skip(&service, request).await;
    service.shutdown().await;
    Ok(result)
}

// Common test utilities for language tests
pub(crate) async fn test_language_execution(
    language: Language,
    code: &str,
    expected: &str,
) -> Result<()> {
    let Some(result) = run(language, code, default_timeout(), 32.0).await? else {
        return Ok(());
    };
    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.output, expected);
    assert_eq!(result.error, None);
    assert!(result.metrics.memory_used_mb >= 0.0);
    Ok(())
}

pub(crate) async fn test_language_failure(
    language: Language,
    code: &str,
    expected_fragment: &str,
) -> Result<Option<ExecutionResult>> {
    let Some(result) = run(language, code, default_timeout(), 32.0).await? else {
        return Ok(None);
    };
    assert!(!result.success);
    let error = result.error.clone().unwrap_or_default();
    assert!(
        error.contains(expected_fragment),
        "error {:?} does not mention {:?}",
        error,
        expected_fragment
    );
    Ok(Some(result))
}

pub(crate) async fn test_language_timeout(language: Language, code: &str) -> Result<()> {
    let timeout = short_timeout();
    let Some(result) = run(language, code, timeout, 32.0).await? else {
        return Ok(());
    };
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some(TIME_LIMIT_MESSAGE));
    assert!(result.metrics.execution_time_ms >= timeout.as_millis() as u64);
    assert!(
        result.metrics.execution_time_ms < timeout.as_millis() as u64 + 500,
        "timeout overshoot: {}ms",
        result.metrics.execution_time_ms
    );
    Ok(())
}

pub(crate) async fn test_language_memory_limit(language: Language, code: &str) -> Result<()> {
    let Some(result) = run(language, code, Duration::from_secs(10), 32.0).await? else {
        return Ok(());
    };
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some(MEMORY_LIMIT_MESSAGE));
    assert!(result.metrics.execution_time_ms < 10_000);
    Ok(())
}

pub(crate) async fn test_partial_output(language: Language, code: &str) -> Result<()> {
    let Some(result) = run(language, code, short_timeout(), 32.0).await? else {
        return Ok(());
    };
    assert!(!result.success);
    assert_eq!(result.output, "before\n");
    assert_eq!(result.error.as_deref(), Some(TIME_LIMIT_MESSAGE));
    Ok(())
}

/// A forced termination must not leave the engine unusable.
pub(crate) async fn test_reuse_after_timeout(
    language: Language,
    runaway: &str,
    hello: &str,
    expected: &str,
) -> Result<()> {
    if skip_if_not_available(&[tool_for(language)]) {
        return Ok(());
    }
    let service = test_service().await?;
    let Some(first) = execute_or_skip(
        &service,
        request(language, runaway).with_timeout(short_timeout()),
    )
    .await
    else {
        return Ok(());
    };
    assert_eq!(first.error.as_deref(), Some(TIME_LIMIT_MESSAGE));

    let second = service.execute(request(language, hello)).await;
    assert!(second.success, "engine not recycled: {:?}", second.error);
    assert_eq!(second.output, expected);
    service.shutdown().await;
    Ok(())
}

/// Run `first` and then `second` on one engine. Whatever `first` does, the
/// engine stays ready and `second` prints exactly `expected`.
///
/// Returns the first result for further checks, or `None` when skipped.
pub(crate) async fn test_sequential_isolation(
    language: Language,
    first: &str,
    second: &str,
    expected: &str,
) -> Result<Option<ExecutionResult>> {
    if skip_if_not_available(&[tool_for(language)]) {
        return Ok(None);
    }
    let service = test_service().await?;
    let Some(first) = execute_or_skip(&service, request(language, first)).await else {
        return Ok(None);
    };

    let second = service.execute(request(language, second)).await;
    assert!(second.success, "second submission failed: {:?}", second.error);
    assert_eq!(second.output, expected);
    assert!(service
        .engine_states()
        .iter()
        .any(|(l, state)| *l == language && *state == EngineState::Ready));
    service.shutdown().await;
    Ok(Some(first))
}

/// Submissions for the same language never see each other's output.
pub(crate) async fn test_concurrent_isolation(
    language: Language,
    program: impl Fn(usize) -> String,
) -> Result<()> {
    if skip_if_not_available(&[tool_for(language)]) {
        return Ok(());
    }
    let service = test_service().await?;
    if execute_or_skip(&service, request(language, &program(0)))
        .await
        .is_none()
    {
        return Ok(());
    }

    let mut handles = Vec::new();
    for i in 1..=4 {
        let service: CodeExecutionService = service.clone();
        let code = program(i);
        handles.push(tokio::spawn(async move {
            (i, service.execute(request(language, &code)).await)
        }));
    }
    for handle in handles {
        let (i, result) = handle.await.unwrap();
        assert!(result.success, "run {} failed: {:?}", i, result.error);
        assert_eq!(result.output, format!("{i}\n{i}\n{i}\n"));
    }
    service.shutdown().await;
    Ok(())
}
