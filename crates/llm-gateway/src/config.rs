//! CLI argument parsing and project-file loading.
//!
//! A `clap`-derived `Args` plus a small TOML loader for the static project
//! table: project definitions are configuration data, but the loader that
//! turns them into a `ProjectRegistry` is plumbing the gateway still needs
//! to boot.

use anyhow::{Context, Result};
use clap::Parser;
use gateway_core::{GenParams, Project};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-tenant MQTT-fronted LLM inference gateway")]
pub struct Args {
    /// TOML file defining the enabled projects.
    #[arg(long)]
    pub config: PathBuf,

    /// HTTP base URL of the OpenAI-compatible inference backend.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub backend_url: String,

    #[arg(long, default_value = "127.0.0.1")]
    pub mqtt_host: String,
    #[arg(long, default_value_t = 1883)]
    pub mqtt_port: u16,
    #[arg(long)]
    pub mqtt_username: Option<String>,
    #[arg(long)]
    pub mqtt_password: Option<String>,

    #[arg(long, default_value_t = 8)]
    pub num_workers: usize,
    #[arg(long, default_value_t = 4)]
    pub inference_slots: usize,
    /// Queue capacity; defaults to `4 * num_workers` when unset.
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    #[arg(long, default_value_t = 1024)]
    pub max_concurrent_sessions: usize,
    #[arg(long, default_value_t = 1800)]
    pub session_timeout_secs: u64,
    #[arg(long, default_value_t = 4096)]
    pub max_history_tokens: usize,

    #[arg(long, default_value_t = 20)]
    pub max_requests_per_window: u32,
    #[arg(long, default_value_t = 60)]
    pub window_duration_secs: u64,

    #[arg(long, default_value_t = 60)]
    pub request_ttl_secs: u64,
    #[arg(long, default_value_t = 10)]
    pub shutdown_deadline_secs: u64,
    #[arg(long, default_value_t = 60)]
    pub reaper_interval_secs: u64,
    #[arg(long, default_value_t = 30)]
    pub stats_interval_secs: u64,

    #[arg(long, default_value_t = 0.7)]
    pub default_temperature: f32,
    #[arg(long, default_value_t = 0.9)]
    pub default_top_p: f32,
    #[arg(long, default_value_t = 512)]
    pub default_max_tokens: u32,
    #[arg(long, default_value_t = false)]
    pub default_enable_thinking: bool,
}

impl Args {
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.num_workers * 4)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window_duration_secs)
    }
    pub fn request_ttl(&self) -> Duration {
        Duration::from_secs(self.request_ttl_secs)
    }
    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_secs(self.shutdown_deadline_secs)
    }
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    pub fn default_gen_params(&self) -> GenParams {
        GenParams {
            temperature: self.default_temperature,
            top_p: self.default_top_p,
            max_tokens: self.default_max_tokens,
            enable_thinking: self.default_enable_thinking,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProjectsFile {
    #[serde(rename = "project", default)]
    projects: Vec<ProjectEntry>,
}

#[derive(Debug, Deserialize)]
struct ProjectEntry {
    name: String,
    #[serde(default)]
    system_prompt: String,
    input_topic: Option<String>,
    reply_topic_template: Option<String>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    max_tokens: Option<u32>,
    enable_thinking: Option<bool>,
}

/// Loads the static project table from a TOML file.
pub fn load_projects(path: &PathBuf, defaults: GenParams) -> Result<Vec<Project>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading project config {}", path.display()))?;
    let parsed: ProjectsFile =
        toml::from_str(&raw).with_context(|| format!("parsing project config {}", path.display()))?;

    if parsed.projects.is_empty() {
        anyhow::bail!("project config {} defines no projects", path.display());
    }

    Ok(parsed
        .projects
        .into_iter()
        .map(|entry| {
            let input_topic = entry
                .input_topic
                .unwrap_or_else(|| format!("{}/user_input", entry.name));
            let reply_topic_template = entry
                .reply_topic_template
                .unwrap_or_else(|| format!("{}/assistant_response/{{sessionId}}", entry.name));
            let gen_params = GenParams {
                temperature: entry.temperature.unwrap_or(defaults.temperature),
                top_p: entry.top_p.unwrap_or(defaults.top_p),
                max_tokens: entry.max_tokens.unwrap_or(defaults.max_tokens),
                enable_thinking: entry.enable_thinking.unwrap_or(defaults.enable_thinking),
            };
            Project {
                name: entry.name,
                system_prompt: entry.system_prompt,
                input_topic,
                reply_topic_template,
                default_gen_params: gen_params,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_projects_with_defaults_filled_in() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[project]]
            name = "general"
            system_prompt = "SYS"

            [[project]]
            name = "maze"
            system_prompt = "MAZE"
            reply_topic_template = "custom/{{sessionId}}"
            temperature = 0.1
            "#
        )
        .unwrap();

        let defaults = GenParams::default();
        let projects = load_projects(&file.path().to_path_buf(), defaults).unwrap();

        assert_eq!(projects.len(), 2);
        let general = projects.iter().find(|p| p.name == "general").unwrap();
        assert_eq!(general.input_topic, "general/user_input");
        assert_eq!(
            general.reply_topic_template,
            "general/assistant_response/{sessionId}"
        );
        assert_eq!(general.default_gen_params.temperature, defaults.temperature);

        let maze = projects.iter().find(|p| p.name == "maze").unwrap();
        assert_eq!(maze.reply_topic_template, "custom/{sessionId}");
        assert_eq!(maze.default_gen_params.temperature, 0.1);
    }

    #[test]
    fn rejects_empty_project_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "").unwrap();
        let result = load_projects(&file.path().to_path_buf(), GenParams::default());
        assert!(result.is_err());
    }
}
