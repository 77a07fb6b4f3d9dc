use super::{
    test_language_execution, test_language_failure, test_language_timeout,
    test_reuse_after_timeout,
};
use crate::{
    tests::fixtures::{code_samples::TS_HELLO, failures, runaway, test_scenarios},
    Language, Result,
};

#[tokio::test]
async fn test_typescript_basic() -> Result<()> {
    test_language_execution(Language::TypeScript, TS_HELLO, "Hello, TypeScript\n").await
}

#[tokio::test]
async fn test_typescript_types_and_enums() -> Result<()> {
    test_language_execution(Language::TypeScript, test_scenarios::TS_INTERFACE, "5 y\n").await
}

#[tokio::test]
async fn test_typescript_runtime_error() -> Result<()> {
    test_language_failure(Language::TypeScript, failures::TS_THROW, "TypeError: typed boom").await?;
    Ok(())
}

#[tokio::test]
async fn test_typescript_timeout() -> Result<()> {
    test_language_timeout(Language::TypeScript, runaway::TS_SPIN).await
}

#[tokio::test]
async fn test_typescript_reuse_after_timeout() -> Result<()> {
    test_reuse_after_timeout(
        Language::TypeScript,
        runaway::TS_SPIN,
        TS_HELLO,
        "Hello, TypeScript\n",
    )
    .await
}
