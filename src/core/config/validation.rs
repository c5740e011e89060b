use serde_json::{Map, Value};

use crate::core::errors::ApiError;

const LLM_PROVIDERS: [&str; 3] = ["ollama", "openai", "gemini"];
const EMBEDDING_PROVIDERS: [&str; 2] = ["ollama", "openai"];
const SEARCH_PROVIDERS: [&str; 4] = ["duckduckgo", "google", "brave", "bing"];
const RERANKER_PROVIDERS: [&str; 2] = ["embedding", "cross_encoder"];

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65_535)?;
        validate_string_array_field(server, "server.cors_allowed_origins", "cors_allowed_origins")?;
    }

    if let Some(search) = expect_optional_object(root, "search")? {
        validate_choice_field(search, "search.provider", "provider", &SEARCH_PROVIDERS)?;
        validate_u64_field(search, "search.max_results", "max_results", 1, 100)?;
        validate_u64_field(search, "search.results_limit", "results_limit", 1, 500)?;
        validate_u64_field(search, "search.timeout_secs", "timeout_secs", 1, 600)?;
    }

    if let Some(scraper) = expect_optional_object(root, "scraper")? {
        validate_u64_field(scraper, "scraper.timeout_secs", "timeout_secs", 1, 600)?;
        validate_u64_field(scraper, "scraper.max_chars", "max_chars", 1, 5_000_000)?;
        validate_u64_field(scraper, "scraper.concurrency", "concurrency", 1, 64)?;
        validate_optional_string_field(scraper, "scraper.user_agent", "user_agent")?;
    }

    if let Some(chunking) = expect_optional_object(root, "chunking")? {
        validate_u64_field(chunking, "chunking.chunk_size", "chunk_size", 2, 100_000)?;
        validate_u64_field(chunking, "chunking.chunk_overlap", "chunk_overlap", 0, 99_999)?;
        let size = chunking
            .get("chunk_size")
            .and_then(Value::as_u64)
            .unwrap_or(800);
        let overlap = chunking
            .get("chunk_overlap")
            .and_then(Value::as_u64)
            .unwrap_or(100);
        if overlap >= size {
            return Err(ApiError::BadRequest(
                "Invalid config at 'chunking.chunk_overlap': must be smaller than chunk_size"
                    .to_string(),
            ));
        }
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_choice_field(llm, "llm.provider", "provider", &LLM_PROVIDERS)?;
        validate_url_field(llm, "llm.base_url", "base_url")?;
        validate_optional_string_field(llm, "llm.model", "model")?;
        validate_u64_field(llm, "llm.timeout_secs", "timeout_secs", 1, 3_600)?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 1_000_000)?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_choice_field(embedding, "embedding.provider", "provider", &EMBEDDING_PROVIDERS)?;
        validate_url_field(embedding, "embedding.base_url", "base_url")?;
        validate_u64_field(embedding, "embedding.timeout_secs", "timeout_secs", 1, 600)?;
    }

    if let Some(reranker) = expect_optional_object(root, "reranker")? {
        validate_bool_field(reranker, "reranker.enabled", "enabled")?;
        validate_choice_field(reranker, "reranker.provider", "provider", &RERANKER_PROVIDERS)?;
        validate_url_field(reranker, "reranker.base_url", "base_url")?;
        validate_u64_field(reranker, "reranker.top_k", "top_k", 1, 100)?;
        validate_u64_field(reranker, "reranker.timeout_secs", "timeout_secs", 1, 600)?;
    }

    if let Some(auth) = expect_optional_object(root, "auth")? {
        validate_bool_field(auth, "auth.enabled", "enabled")?;
        validate_u64_field(
            auth,
            "auth.access_token_expire_minutes",
            "access_token_expire_minutes",
            1,
            525_600,
        )?;
        validate_u64_field(
            auth,
            "auth.login_attempts_per_minute",
            "login_attempts_per_minute",
            1,
            10_000,
        )?;
        validate_optional_string_field(auth, "auth.admin_email", "admin_email")?;
        validate_optional_string_field(auth, "auth.admin_username", "admin_username")?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    match section.get(key) {
        None => Ok(()),
        Some(value) if value.is_boolean() => Ok(()),
        Some(_) => Err(config_type_error(path, "boolean")),
    }
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "non-negative integer"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    match section.get(key) {
        Some(value) if !value.is_string() => Err(config_type_error(path, "string")),
        _ => Ok(()),
    }
}

fn validate_choice_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    choices: &[&str],
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if !choices.contains(&text) {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': expected one of {}",
            path,
            choices.join(", ")
        )));
    }
    Ok(())
}

fn validate_url_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    match url::Url::parse(text) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': expected an http(s) URL",
            path
        ))),
    }
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        match item.as_str() {
            Some(text) if !text.trim().is_empty() => {}
            Some(_) => {
                return Err(ApiError::BadRequest(format!(
                    "Invalid config at '{}[{}]': value cannot be empty",
                    path, index
                )))
            }
            None => return Err(config_type_error(&format!("{}[{}]", path, index), "string")),
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
