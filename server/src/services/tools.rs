//! The built-in tools reachable through `CallTool`.
//!
//! Weather and idol lookups answer from canned data. `launch_github` starts the GitHub MCP server
//! through the process supervisor.

use proclib::{CommandSpec, ProcessSupervisor};
use std::collections::HashMap;
use tracing::info;

pub type Arguments = HashMap<String, String>;

#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("no tool named `{0}`")]
    UnknownTool(String),
    #[error("tool `{tool}` requires argument `{argument}`")]
    MissingArgument {
        tool: &'static str,
        argument: &'static str,
    },
    #[error("invalid value for `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("tool `{tool}` is not configured: {reason}")]
    NotConfigured {
        tool: &'static str,
        reason: &'static str,
    },
    #[error(transparent)]
    Process(#[from] proclib::Error),
}

/// Where and how the GitHub MCP server gets launched.
#[derive(Clone, Debug)]
pub struct GithubSettings {
    pub token: Option<String>,
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub struct ToolBox {
    supervisor: ProcessSupervisor,
    github: GithubSettings,
}

impl ToolBox {
    pub fn new(supervisor: ProcessSupervisor, github: GithubSettings) -> Self {
        Self { supervisor, github }
    }

    pub async fn call(&self, name: &str, arguments: &Arguments) -> Result<String, ToolError> {
        info!(tool = name, "calling tool");
        match name {
            "get_weather" => {
                let city = required(arguments, "get_weather", "city")?;
                Ok(weather_report(city, optional(arguments, "country")))
            }
            "get_idol_info" => {
                let idol_name = required(arguments, "get_idol_info", "idol_name")?;
                idol_info(idol_name)
            }
            "launch_github" => self.launch_github(optional(arguments, "port")).await,
            _ => Err(ToolError::UnknownTool(name.to_string())),
        }
    }

    async fn launch_github(&self, port: Option<&str>) -> Result<String, ToolError> {
        let token = self
            .github
            .token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(ToolError::NotConfigured {
                tool: "launch_github",
                reason: "GITHUB_PERSONAL_ACCESS_TOKEN is not set",
            })?;
        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|err| ToolError::InvalidArgument {
                argument: "port",
                reason: err.to_string(),
            })?,
            None => self.github.port,
        };
        let base_url = format!("http://{}:{}", self.github.host, port);
        let spec = CommandSpec::new("just-aii-guess")
            .args(format!(
                r#"--stdio "npx -y @modelcontextprotocol/server-github" --port {} --baseUrl {} --ssePath /sse"#,
                port, base_url
            ))
            .env("GITHUB_PERSONAL_ACCESS_TOKEN", token);
        let spawned = self.supervisor.spawn(spec).await?;
        Ok(format!(
            "GitHub server starting at {}/sse\nProcess id: {}\nPID: {}",
            base_url, spawned.id, spawned.pid
        ))
    }
}

fn required<'a>(
    arguments: &'a Arguments,
    tool: &'static str,
    argument: &'static str,
) -> Result<&'a str, ToolError> {
    optional(arguments, argument).ok_or(ToolError::MissingArgument { tool, argument })
}

fn optional<'a>(arguments: &'a Arguments, argument: &str) -> Option<&'a str> {
    arguments
        .get(argument)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

// TODO: call a real weather API instead of returning sample data
fn weather_report(city: &str, country: Option<&str>) -> String {
    format!(
        "City: {}\nCountry: {}\nTemperature: 22°C\nCondition: Clear\nHumidity: 65%\nWind speed: 10 km/h\nMeasured at: 2025-04-26T14:30:00",
        city,
        country.unwrap_or("N/A"),
    )
}

struct Idol {
    name: &'static str,
    full_name: &'static str,
    group: &'static str,
    positions: &'static [&'static str],
    birth_date: &'static str,
    agency: &'static str,
    debut_date: &'static str,
    blood_type: &'static str,
    instagram: &'static str,
}

const IDOLS: &[Idol] = &[
    Idol {
        name: "Jimin",
        full_name: "Park Jimin",
        group: "BTS",
        positions: &["Main vocalist", "Lead dancer"],
        birth_date: "1995-10-13",
        agency: "HYBE (Big Hit Music)",
        debut_date: "2013-06-13",
        blood_type: "A",
        instagram: "@j.m",
    },
    Idol {
        name: "IU",
        full_name: "Lee Ji-eun",
        group: "Solo",
        positions: &["Vocalist"],
        birth_date: "1993-05-16",
        agency: "EDAM Entertainment",
        debut_date: "2008-09-18",
        blood_type: "A",
        instagram: "@dlwlrma",
    },
    Idol {
        name: "Winter",
        full_name: "Kim Minjeong",
        group: "aespa",
        positions: &["Lead vocalist", "Lead dancer"],
        birth_date: "2001-01-01",
        agency: "SM Entertainment",
        debut_date: "2020-11-17",
        blood_type: "O",
        instagram: "@aespa_official",
    },
];

fn idol_info(idol_name: &str) -> Result<String, ToolError> {
    if let Some(idol) = IDOLS
        .iter()
        .find(|idol| idol.name.eq_ignore_ascii_case(idol_name))
    {
        return Ok(format!(
            "Name: {}\nGroup: {}\nPositions: {}\nBirth date: {}\nAgency: {}\nDebut date: {}\nBlood type: {}\nInstagram: {}",
            idol.full_name,
            idol.group,
            idol.positions.join(", "),
            idol.birth_date,
            idol.agency,
            idol.debut_date,
            idol.blood_type,
            idol.instagram,
        ));
    }

    let needle = idol_name.to_lowercase();
    let similar: Vec<&str> = IDOLS
        .iter()
        .map(|idol| idol.name)
        .filter(|name| name.to_lowercase().contains(&needle))
        .collect();
    if similar.is_empty() {
        Err(ToolError::NotFound(format!(
            "No information found for '{}'",
            idol_name
        )))
    } else {
        Err(ToolError::NotFound(format!(
            "Could not find '{}'. Did you mean one of: {}?",
            idol_name,
            similar.join(", ")
        )))
    }
}
