use super::{
    test_concurrent_isolation, test_language_execution, test_language_failure,
    test_language_memory_limit, test_language_timeout, test_partial_output,
    test_reuse_after_timeout, test_sequential_isolation,
};
use crate::{
    tests::fixtures::{
        code_samples::PYTHON_HELLO, denied, escapes, failures, leftovers, runaway, test_scenarios,
    },
    Language, Result,
};

#[tokio::test]
async fn test_python_basic() -> Result<()> {
    test_language_execution(Language::Python, PYTHON_HELLO, "Hello\n4\n").await
}

#[tokio::test]
async fn test_python_multiline() -> Result<()> {
    test_language_execution(
        Language::Python,
        test_scenarios::PYTHON_MULTILINE,
        "Factorial of 5 is 120\n",
    )
    .await
}

#[tokio::test]
async fn test_python_allowed_modules() -> Result<()> {
    test_language_execution(
        Language::Python,
        test_scenarios::PYTHON_ALLOWED_MODULES,
        "4.0\n2\n{\"k\": [1, 2]}\n",
    )
    .await
}

#[tokio::test]
async fn test_python_clean_exit_is_success() -> Result<()> {
    test_language_execution(Language::Python, test_scenarios::PYTHON_SYSTEM_EXIT, "bye\n").await
}

#[tokio::test]
async fn test_python_runtime_error() -> Result<()> {
    if let Some(result) =
        test_language_failure(Language::Python, failures::PYTHON_RUNTIME_ERROR, "ValueError: bad value").await?
    {
        assert_eq!(result.output, "start\n");
        assert!(result.error.unwrap().ends_with("(line 2)"));
    }
    Ok(())
}

#[tokio::test]
async fn test_python_syntax_error() -> Result<()> {
    if let Some(result) =
        test_language_failure(Language::Python, failures::PYTHON_SYNTAX_ERROR, "SyntaxError").await?
    {
        assert!(result.output.is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn test_python_timeout() -> Result<()> {
    test_language_timeout(Language::Python, runaway::PYTHON_SPIN).await
}

#[tokio::test]
async fn test_python_partial_output_on_timeout() -> Result<()> {
    test_partial_output(Language::Python, runaway::PYTHON_PARTIAL_THEN_SPIN).await
}

#[tokio::test]
async fn test_python_memory_limit() -> Result<()> {
    test_language_memory_limit(Language::Python, runaway::PYTHON_ALLOCATE).await
}

#[tokio::test]
async fn test_python_reuse_after_timeout() -> Result<()> {
    test_reuse_after_timeout(Language::Python, runaway::PYTHON_SPIN, PYTHON_HELLO, "Hello\n4\n")
        .await
}

#[tokio::test]
async fn test_python_denied_capabilities() -> Result<()> {
    let cases = [
        (denied::PYTHON_OPEN, "NameError"),
        (denied::PYTHON_IMPORT_OS, "ImportError"),
        (denied::PYTHON_IMPORT_SOCKET, "ImportError"),
        (denied::PYTHON_DUNDER_IMPORT, "ImportError"),
        (denied::PYTHON_EVAL, "NameError"),
    ];
    for (code, expected) in cases {
        if test_language_failure(Language::Python, code, expected)
            .await?
            .is_none()
        {
            return Ok(());
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_python_concurrent_isolation() -> Result<()> {
    test_concurrent_isolation(Language::Python, |i| {
        format!("import time\nfor _ in range(3):\n    print({i})\n    time.sleep(0.05)")
    })
    .await
}

#[tokio::test]
async fn test_python_frames_are_unreachable() -> Result<()> {
    let cases = [
        (escapes::PYTHON_TRACEBACK_FRAME, "AttributeError: capability denied: tb_frame"),
        (escapes::PYTHON_GENERATOR_FRAME, "AttributeError: capability denied: gi_frame"),
    ];
    for (code, expected) in cases {
        match test_language_failure(Language::Python, code, expected).await? {
            Some(result) => assert_eq!(result.output, ""),
            None => return Ok(()),
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_python_modules_expose_public_names_only() -> Result<()> {
    let cases = [
        (escapes::PYTHON_PRIVATE_MODULE_ATTR, "has no attribute '_os'"),
        (escapes::PYTHON_MODULE_REEXPORT, "has no attribute 'sys'"),
    ];
    for (code, expected) in cases {
        if test_language_failure(Language::Python, code, expected)
            .await?
            .is_none()
        {
            return Ok(());
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_python_forged_events_stay_inside_the_job() -> Result<()> {
    if let Some(first) = test_sequential_isolation(
        Language::Python,
        escapes::PYTHON_FORGED_EVENTS,
        PYTHON_HELLO,
        "Hello\n4\n",
    )
    .await?
    {
        assert!(first.success, "forging job failed: {:?}", first.error);
        assert!(first.output.ends_with("after\n"), "{:?}", first.output);
    }
    Ok(())
}

#[tokio::test]
async fn test_python_module_changes_do_not_carry_over() -> Result<()> {
    if let Some(first) = test_sequential_isolation(
        Language::Python,
        leftovers::PYTHON_MUTATE_MODULE,
        leftovers::PYTHON_READ_MODULE,
        "3.141592653589793\n",
    )
    .await?
    {
        assert_eq!(first.output, "3\n");
    }

    if let Some(first) = test_sequential_isolation(
        Language::Python,
        leftovers::PYTHON_PATCH_CLASS,
        leftovers::PYTHON_USE_CLASS,
        "[('a', 2)]\n",
    )
    .await?
    {
        assert_eq!(first.output, "patched\n");
    }
    Ok(())
}
