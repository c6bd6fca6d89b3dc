//! Agent and command subcommands: `agents`, `create`, `exec`, `history`, ...

use craftfleet_control::daemon::{AgentCommandResult, DaemonClient, DaemonCommand};
use craftfleet_types::{AgentRecord, CommandResult, FleetStats, HistoryEntry, HistoryKind};

use super::{parse_params, request};

/// List all agents as a table.
pub fn agents(client: &DaemonClient) -> anyhow::Result<()> {
    let response = request(client, &DaemonCommand::ListAgents)?;
    let agents: Vec<AgentRecord> = serde_json::from_value(response.data.unwrap_or_default())?;

    if agents.is_empty() {
        println!("No agents.");
        return Ok(());
    }

    println!(
        "{:<4} {:<16} {:<13} {:<20} {:<24} {:<10}",
        "ID", "NAME", "STATE", "ACTIVITY", "POSITION", "HEALTH"
    );
    println!("{}", "-".repeat(90));
    for agent in &agents {
        println!("{}", agent_row(agent));
    }
    Ok(())
}

fn agent_row(agent: &AgentRecord) -> String {
    format!(
        "{:<4} {:<16} {:<13} {:<20} {:<24} {:<10}",
        agent.id,
        agent.name,
        agent.state.to_string(),
        agent.activity.to_string(),
        agent.position.to_string(),
        format!("{:.0}/{:.0}", agent.health, agent.food),
    )
}

/// Show one agent in detail.
pub fn agent(client: &DaemonClient, id: u32) -> anyhow::Result<()> {
    let response = request(client, &DaemonCommand::AgentStatus { id })?;
    let agent: AgentRecord = serde_json::from_value(response.data.unwrap_or_default())?;

    println!("Agent {} ({})", agent.id, agent.name);
    println!("  State:     {}", agent.state);
    println!("  Activity:  {}", agent.activity);
    println!("  Server:    {}", agent.server);
    println!("  Position:  {}", agent.position);
    println!("  Health:    {:.1}", agent.health);
    println!("  Food:      {:.1}", agent.food);
    if let Some(at) = agent.connected_at {
        println!("  Connected: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(command) = &agent.last_command {
        println!("  Last cmd:  {command}");
    }
    Ok(())
}

pub fn create(client: &DaemonClient, id: u32, name: Option<String>) -> anyhow::Result<()> {
    let response = request(client, &DaemonCommand::CreateAgent { id, name })?;
    println!("{}", response.message);
    Ok(())
}

pub fn spawn(client: &DaemonClient, count: usize) -> anyhow::Result<()> {
    let response = request(client, &DaemonCommand::CreateAgents { count })?;
    let agents: Vec<AgentRecord> = serde_json::from_value(response.data.unwrap_or_default())?;
    for agent in &agents {
        println!("created {} (agent {})", agent.name, agent.id);
    }
    if agents.len() < count {
        println!("{} of {count} requested agents created", agents.len());
    }
    Ok(())
}

pub fn remove(client: &DaemonClient, id: u32) -> anyhow::Result<()> {
    let response = request(client, &DaemonCommand::RemoveAgent { id })?;
    println!("{}", response.message);
    Ok(())
}

/// Run one command on one agent and print its result.
pub fn exec(client: &DaemonClient, id: u32, command: &str, params: &str) -> anyhow::Result<()> {
    let params = parse_params(params)?;
    let response = request(
        client,
        &DaemonCommand::Execute {
            id,
            command: command.to_string(),
            params,
        },
    )?;

    println!("{}", response.message);
    if let Some(data) = response.data {
        println!("{}", serde_json::to_string_pretty(&data)?);
    }
    Ok(())
}

/// Run one command on every agent and print one line per agent.
pub fn broadcast(client: &DaemonClient, command: &str, params: &str) -> anyhow::Result<()> {
    let params = parse_params(params)?;
    let response = request(
        client,
        &DaemonCommand::Broadcast {
            command: command.to_string(),
            params,
        },
    )?;
    let results: Vec<AgentCommandResult> =
        serde_json::from_value(response.data.unwrap_or_default())?;

    for entry in &results {
        println!("{}", result_line(entry.id, &entry.result));
    }
    println!("{}", response.message);
    Ok(())
}

fn result_line(id: u32, result: &CommandResult) -> String {
    let status = if result.success { "ok" } else { "failed" };
    format!("agent {id:<4} {status:<7} {}", result.message)
}

pub fn stop_all(client: &DaemonClient) -> anyhow::Result<()> {
    let response = request(client, &DaemonCommand::StopAll)?;
    println!("{}", response.message);
    Ok(())
}

/// Show fleet counters.
pub fn stats(client: &DaemonClient) -> anyhow::Result<()> {
    let response = request(client, &DaemonCommand::Stats)?;
    let stats: FleetStats = serde_json::from_value(response.data.unwrap_or_default())?;

    println!("Fleet stats");
    println!("  Uptime:     {}s", stats.uptime_secs);
    println!("  Agents:     {} registered, {} connected", stats.fleet_size, stats.active);
    println!("  Created:    {}", stats.total_created);
    println!("  Commands:   {}", stats.commands_executed);
    println!("  Messages:   {}", stats.messages_sent);
    println!("  Movements:  {}", stats.movements);
    println!("  Errors:     {}", stats.errors);
    Ok(())
}

/// Show recent history, newest first.
pub fn history(client: &DaemonClient, limit: Option<usize>) -> anyhow::Result<()> {
    let response = request(client, &DaemonCommand::History { limit })?;
    let entries: Vec<HistoryEntry> = serde_json::from_value(response.data.unwrap_or_default())?;

    if entries.is_empty() {
        println!("No history yet.");
        return Ok(());
    }
    for entry in &entries {
        println!("{}", history_line(entry));
    }
    Ok(())
}

fn history_line(entry: &HistoryEntry) -> String {
    let kind = match entry.kind {
        HistoryKind::Command => "command",
        HistoryKind::Chat => "chat",
        HistoryKind::System => "system",
        HistoryKind::Error => "error",
    };
    format!(
        "{} [{kind:<7}] {}",
        entry.timestamp.format("%H:%M:%S"),
        entry.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftfleet_types::ServerConfig;

    #[test]
    fn agent_row_shows_state_and_vitals() {
        let mut record = AgentRecord::new(3, "Bot_3", &ServerConfig::default());
        record.health = 20.0;
        record.food = 18.0;
        let row = agent_row(&record);
        assert!(row.starts_with("3    Bot_3"));
        assert!(row.contains("connecting"));
        assert!(row.contains("20/18"));
    }

    #[test]
    fn result_line_marks_failures() {
        let line = result_line(
            2,
            &CommandResult::failed(&craftfleet_types::FleetError::AgentUnavailable(2)),
        );
        assert!(line.contains("failed"));
        assert!(result_line(1, &CommandResult::ok("jumped")).contains("ok"));
    }

    #[test]
    fn history_line_includes_kind() {
        let entry = HistoryEntry {
            timestamp: chrono::Utc::now(),
            kind: HistoryKind::System,
            message: "created Bot_1".into(),
            fleet_size: 1,
        };
        assert!(history_line(&entry).contains("[system ] created Bot_1"));
    }
}
