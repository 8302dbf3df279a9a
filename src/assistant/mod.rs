//! Natural-language questions about the task list, answered by a hosted
//! chat-completion model.

pub mod keyring;

use chrono::NaiveDate;

use crate::config::AssistantConfig;
use crate::core::task::Task;
use crate::error::{Error, Result};

const SYSTEM_PROMPT: &str = "Helpful assistant for task planning.";

pub const API_KEY_ENV: &str = "GROQ_API_KEY";

/// Keys issued by the provider start with `gsk_`.
pub fn is_valid_api_key(key: &str) -> bool {
    let key = key.trim();
    key.starts_with("gsk_") && key.len() > 20
}

fn due_status(today: NaiveDate, due: NaiveDate) -> String {
    let days = (due - today).num_days();
    match days {
        d if d < 0 => format!("(OVERDUE - {} days ago)", -d),
        0 => "(TODAY - URGENT)".to_string(),
        1 => "(TOMORROW)".to_string(),
        d => format!("(in {} days)", d),
    }
}

/// Build the user message: today's date, every task with its status, and the question.
pub fn build_prompt(tasks: &[Task], question: &str, today: NaiveDate, user_name: &str) -> String {
    let task_context = if tasks.is_empty() {
        format!("{} has no tasks yet.", user_name)
    } else {
        tasks
            .iter()
            .enumerate()
            .map(|(i, task)| {
                format!(
                    "{}. Subject: {}\nDescription: {}\nDue: {} {}",
                    i + 1,
                    if task.title.is_empty() { "No subject" } else { task.title.as_str() },
                    if task.description.is_empty() { "No description" } else { task.description.as_str() },
                    task.due_date_string(),
                    due_status(today, task.due_date),
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        "You are an assistant for {}.\nToday's date: {} ({})\nTasks:\n{}\nAnswer in a friendly tone, with emojis. Question: {}",
        user_name,
        today.format("%Y-%m-%d"),
        today.format("%A"),
        task_context,
        question.trim(),
    )
}

/// Pull the first choice's text out of a chat-completion response.
pub fn extract_answer(response: &serde_json::Value) -> Result<String> {
    response["choices"]
        .as_array()
        .and_then(|choices| choices.first())
        .and_then(|choice| choice["message"]["content"].as_str())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or(Error::EmptyResponse)
}

/// Send one prompt to the chat-completion endpoint and return the answer text.
pub async fn complete(config: &AssistantConfig, api_key: &str, prompt: &str) -> Result<String> {
    let body = serde_json::json!({
        "model": config.model,
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": prompt }
        ],
        "max_tokens": config.max_tokens,
        "temperature": config.temperature,
    });

    let client = reqwest::Client::new();
    let resp = client
        .post(&config.url)
        .bearer_auth(api_key)
        .header("content-type", "application/json")
        .json(&body)
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        return Err(match status.as_u16() {
            429 => Error::RateLimited,
            401 => Error::InvalidApiKey,
            code => Error::Api {
                status: code,
                body: resp.text().await.unwrap_or_default(),
            },
        });
    }

    let api_resp: serde_json::Value = resp.json().await?;
    extract_answer(&api_resp)
}

/// Answer a question about `tasks`.
pub async fn ask(
    config: &AssistantConfig,
    api_key: &str,
    tasks: &[Task],
    question: &str,
    today: NaiveDate,
    user_name: &str,
) -> Result<String> {
    if question.trim().is_empty() {
        return Err(Error::InvalidTask("please type a question".into()));
    }
    let prompt = build_prompt(tasks, question, today, user_name);
    log::debug!("Asking assistant about {} tasks", tasks.len());
    complete(config, api_key, &prompt).await
}

/// Check the key and endpoint with a minimal request.
pub async fn verify_connection(config: &AssistantConfig, api_key: &str) -> Result<bool> {
    let answer = complete(config, api_key, "Reply \"OK\"").await?;
    Ok(answer.trim_matches(|c: char| !c.is_alphanumeric()) == "OK")
}

/// API key from the environment, else from the keyring.
pub async fn load_api_key() -> Result<Option<String>> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Ok(Some(key.trim().to_string()));
        }
    }
    keyring::load_api_key().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn validates_api_keys() {
        assert!(is_valid_api_key("gsk_0123456789abcdefghij"));
        assert!(is_valid_api_key("  gsk_0123456789abcdefghij  "));
        assert!(!is_valid_api_key("gsk_short"));
        assert!(!is_valid_api_key("sk-0123456789abcdefghijklmn"));
    }

    #[test]
    fn prompt_lists_tasks_with_status() {
        let today = date(2026, 3, 10);
        let tasks = vec![
            Task::new("History", "essay", date(2026, 3, 7)),
            Task::new("Math", "page 12", today),
            Task::new("Art", "sketch", date(2026, 3, 11)),
            Task::new("Music", "", date(2026, 3, 15)),
        ];
        let prompt = build_prompt(&tasks, " What is due tomorrow? ", today, "Ana");

        assert!(prompt.starts_with("You are an assistant for Ana."));
        assert!(prompt.contains("Today's date: 2026-03-10 (Tuesday)"));
        assert!(prompt.contains("1. Subject: History\nDescription: essay\nDue: 2026-03-07 (OVERDUE - 3 days ago)"));
        assert!(prompt.contains("Due: 2026-03-10 (TODAY - URGENT)"));
        assert!(prompt.contains("Due: 2026-03-11 (TOMORROW)"));
        assert!(prompt.contains("Description: No description\nDue: 2026-03-15 (in 5 days)"));
        assert!(prompt.ends_with("Question: What is due tomorrow?"));
    }

    #[test]
    fn prompt_for_empty_list() {
        let prompt = build_prompt(&[], "anything overdue?", date(2026, 3, 10), "Ana");
        assert!(prompt.contains("Ana has no tasks yet."));
    }

    #[test]
    fn extracts_first_choice() {
        let resp = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "  You have 2 tasks.  " } }]
        });
        assert_eq!(extract_answer(&resp).unwrap(), "You have 2 tasks.");

        let empty = serde_json::json!({ "choices": [{ "message": { "content": "   " } }] });
        assert!(matches!(extract_answer(&empty), Err(Error::EmptyResponse)));
        assert!(matches!(
            extract_answer(&serde_json::json!({})),
            Err(Error::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn empty_question_is_rejected_before_any_request() {
        let config = AssistantConfig {
            url: "http://127.0.0.1:9/unused".into(),
            ..AssistantConfig::default()
        };
        let result = ask(&config, "gsk_0123456789abcdefghij", &[], "   ", date(2026, 3, 10), "Ana").await;
        assert!(matches!(result, Err(Error::InvalidTask(_))));
    }
}
