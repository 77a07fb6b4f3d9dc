use super::{
    test_concurrent_isolation, test_language_execution, test_language_failure,
    test_language_memory_limit, test_language_timeout, test_partial_output,
    test_reuse_after_timeout, test_sequential_isolation,
};
use crate::{
    tests::fixtures::{
        code_samples::JS_HELLO, denied, escapes, failures, leftovers, runaway, test_scenarios,
    },
    Language, Result,
};

#[tokio::test]
async fn test_javascript_basic() -> Result<()> {
    test_language_execution(Language::JavaScript, JS_HELLO, "Hello\n4\n").await
}

#[tokio::test]
async fn test_javascript_async_completion() -> Result<()> {
    test_language_execution(Language::JavaScript, test_scenarios::JS_ASYNC, "later\n").await
}

#[tokio::test]
async fn test_javascript_console_formatting() -> Result<()> {
    test_language_execution(
        Language::JavaScript,
        test_scenarios::JS_FORMATTING,
        "list has 3 items\n{ a: 1 }\nerr [ 1, 2 ]\n",
    )
    .await
}

#[tokio::test]
async fn test_javascript_throw() -> Result<()> {
    if let Some(result) = test_language_failure(Language::JavaScript, failures::JS_THROW, "boom").await? {
        assert_eq!(result.output, "");
        assert_eq!(result.error.as_deref(), Some("Error: boom"));
    }
    Ok(())
}

#[tokio::test]
async fn test_javascript_syntax_error() -> Result<()> {
    test_language_failure(Language::JavaScript, failures::JS_SYNTAX_ERROR, "SyntaxError").await?;
    Ok(())
}

#[tokio::test]
async fn test_javascript_rejected_promise() -> Result<()> {
    test_language_failure(
        Language::JavaScript,
        failures::JS_REJECTED_PROMISE,
        "Error: nope",
    )
    .await?;
    Ok(())
}

#[tokio::test]
async fn test_javascript_timeout() -> Result<()> {
    test_language_timeout(Language::JavaScript, runaway::JS_SPIN).await
}

#[tokio::test]
async fn test_javascript_partial_output_on_timeout() -> Result<()> {
    test_partial_output(Language::JavaScript, runaway::JS_PARTIAL_THEN_SPIN).await
}

#[tokio::test]
async fn test_javascript_memory_limit() -> Result<()> {
    test_language_memory_limit(Language::JavaScript, runaway::JS_ALLOCATE).await
}

#[tokio::test]
async fn test_javascript_reuse_after_timeout() -> Result<()> {
    test_reuse_after_timeout(Language::JavaScript, runaway::JS_SPIN, JS_HELLO, "Hello\n4\n").await
}

#[tokio::test]
async fn test_javascript_denied_capabilities() -> Result<()> {
    let cases = [
        (denied::JS_REQUIRE, "ReferenceError"),
        (denied::JS_PROCESS, "ReferenceError"),
        (denied::JS_FETCH, "ReferenceError"),
        (denied::JS_EVAL, "EvalError"),
        (denied::JS_FUNCTION_CONSTRUCTOR, "EvalError"),
        (denied::JS_CONSOLE_CONSTRUCTOR, "EvalError"),
    ];
    for (code, expected) in cases {
        if test_language_failure(Language::JavaScript, code, expected)
            .await?
            .is_none()
        {
            return Ok(());
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_javascript_concurrent_isolation() -> Result<()> {
    test_concurrent_isolation(Language::JavaScript, |i| {
        format!(
            "(async () => {{ for (let n = 0; n < 3; n++) {{ console.log({i}); \
             const until = performance.now() + 50; while (performance.now() < until) {{}} }} }})()"
        )
    })
    .await
}

#[tokio::test]
async fn test_javascript_console_prototype_changes_stay_in_context() -> Result<()> {
    if let Some(first) = test_sequential_isolation(
        Language::JavaScript,
        escapes::JS_HOST_PROTOTYPE,
        leftovers::JS_CLEAN_JSON,
        "clean {\"a\":1}\n",
    )
    .await?
    {
        assert!(first.success, "{:?}", first.error);
        assert_eq!(first.output, "polluted\n");
    }
    Ok(())
}

#[tokio::test]
async fn test_javascript_globals_do_not_carry_over() -> Result<()> {
    if let Some(first) = test_sequential_isolation(
        Language::JavaScript,
        leftovers::JS_MUTATE_BUILTINS,
        leftovers::JS_READ_BUILTINS,
        "undefined undefined\n",
    )
    .await?
    {
        assert_eq!(first.output, "set\n");
    }
    Ok(())
}
