use anyhow::{anyhow, bail, Result};
use clap::Subcommand;
use tracing::info;

use crate::{
    app::App,
    storage::{
        entities::{Client, Project, TimeEntry},
        record_storage::{Query, RecordStore},
    },
    utils::{
        clock::Clock,
        validation::{validate_color, validate_name, validate_rate},
    },
};

use super::lookup::{by_id_prefix, short_id};

const DEFAULT_CLIENT_COLOR: &str = "007AFF";

#[derive(Subcommand, Debug)]
pub enum ClientCommand {
    #[command(about = "Add a client")]
    Add {
        name: String,
        #[arg(long, default_value_t = 0., help = "Default hourly rate of the client's projects")]
        rate: f64,
        #[arg(long, default_value = DEFAULT_CLIENT_COLOR, help = "Hex color, e.g. FF9500")]
        color: String,
    },
    #[command(about = "List clients")]
    List,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    #[command(about = "Add a project")]
    Add {
        name: String,
        #[arg(long, help = "Hourly rate. Defaults to the client's rate")]
        rate: Option<f64>,
        #[arg(long, help = "Name of the client the project belongs to")]
        client: Option<String>,
    },
    #[command(about = "List projects, most recently used first")]
    List {
        #[arg(long, help = "Include archived projects")]
        all: bool,
    },
    #[command(about = "Archive a project. Archived projects keep their time entries")]
    Archive {
        #[arg(help = "Project name or id prefix")]
        project: String,
    },
    #[command(about = "Delete a project together with its time entries")]
    Delete {
        #[arg(help = "Project name or id prefix")]
        project: String,
    },
}

pub async fn process_client_command(app: &App, command: ClientCommand) -> Result<()> {
    match command {
        ClientCommand::Add { name, rate, color } => {
            let name = validate_name("client name", &name)?;
            let rate = validate_rate(rate)?;
            let color = validate_color(&color)?;
            if find_client(app, &name).await?.is_some() {
                bail!("Client {name:?} already exists");
            }

            let client = Client::new(name, color, rate, app.clock.time());
            app.records.insert(client.clone()).await?;
            app.records.save().await?;
            info!("Added client {:?}", client.id);
            println!("Added client {}", client.name);
        }
        ClientCommand::List => {
            let clients = app
                .records
                .fetch(Query::<Client>::all().sort_by(|a, b| a.name.cmp(&b.name)))
                .await?;
            for client in clients {
                println!(
                    "{}\t#{}\t{:.2}/h",
                    client.name, client.color_hex, client.default_hourly_rate
                );
            }
        }
    }
    Ok(())
}

pub async fn process_project_command(app: &App, command: ProjectCommand) -> Result<()> {
    match command {
        ProjectCommand::Add { name, rate, client } => {
            let name = validate_name("project name", &name)?;
            if find_project_by_name(app, &name).await?.is_some() {
                bail!("Project {name:?} already exists");
            }
            let client = match client {
                Some(client_name) => Some(
                    find_client(app, &client_name)
                        .await?
                        .ok_or_else(|| anyhow!("No client named {client_name:?}"))?,
                ),
                None => None,
            };
            let rate = match rate {
                Some(rate) => validate_rate(rate)?,
                None => client.as_ref().map(|c| c.default_hourly_rate).unwrap_or(0.),
            };

            let project = Project::new(name, rate, client.as_ref().map(|c| c.id), app.clock.time());
            app.records.insert(project.clone()).await?;
            app.records.save().await?;
            info!("Added project {:?}", project.id);
            println!("Added project {}", project.display_name(client.as_ref()));
        }
        ProjectCommand::List { all } => {
            let projects = app
                .records
                .fetch(
                    Query::<Project>::all()
                        .filter(move |p| all || !p.is_archived)
                        .sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at)),
                )
                .await?;
            let clients = app.records.fetch(Query::<Client>::all()).await?;
            for project in projects {
                let client = project
                    .client_id
                    .and_then(|id| clients.iter().find(|c| c.id == id));
                println!(
                    "{}\t{}\t{:.2}/h{}",
                    short_id(project.id),
                    project.display_name(client),
                    project.hourly_rate,
                    if project.is_archived { "\tarchived" } else { "" }
                );
            }
        }
        ProjectCommand::Archive { project } => {
            let mut project = resolve_project(&app.records, &project).await?;
            project.is_archived = true;
            app.records.insert(project.clone()).await?;
            app.records.save().await?;
            println!("Archived {}", project.name);
        }
        ProjectCommand::Delete { project } => {
            let project = resolve_project(&app.records, &project).await?;
            let project_id = project.id;
            let entries = app
                .records
                .fetch(Query::<TimeEntry>::all().filter(move |e| e.project_id == project_id))
                .await?;
            for entry in &entries {
                app.records.delete::<TimeEntry>(entry.id).await?;
            }
            app.records.delete::<Project>(project.id).await?;
            app.records.save().await?;
            info!("Deleted project {project_id:?} and {} entries", entries.len());

            println!("Deleted {} and {} time entries", project.name, entries.len());
            if app.billable.current_target().map(|p| p.id) == Some(project_id) {
                println!("The running timer tracks this project and will be discarded on stop");
            }
        }
    }
    Ok(())
}

/// Finds a project by its name (case insensitive) or by a unique prefix of its id.
pub async fn resolve_project(records: &impl RecordStore, query: &str) -> Result<Project> {
    let wanted = query.trim().to_lowercase();
    let projects = records.fetch(Query::<Project>::all()).await?;
    if let Some(project) = projects.iter().find(|p| p.name.to_lowercase() == wanted) {
        return Ok(project.clone());
    }

    by_id_prefix(projects, query, "project")
}

async fn find_project_by_name(app: &App, name: &str) -> Result<Option<Project>> {
    let wanted = name.to_lowercase();
    Ok(app
        .records
        .fetch(
            Query::<Project>::all()
                .filter(move |p| p.name.to_lowercase() == wanted)
                .limit(1),
        )
        .await?
        .into_iter()
        .next())
}

async fn find_client(app: &App, name: &str) -> Result<Option<Client>> {
    let wanted = name.trim().to_lowercase();
    Ok(app
        .records
        .fetch(
            Query::<Client>::all()
                .filter(move |c| c.name.to_lowercase() == wanted)
                .limit(1),
        )
        .await?
        .into_iter()
        .next())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::Duration;
    use tempfile::tempdir;

    use crate::{
        app::App,
        storage::{
            entities::{Client, Project, TimeEntry},
            record_storage::{Query, RecordStore},
        },
        utils::clock::{testing::ManualClock, Clock},
    };

    use super::{
        process_client_command, process_project_command, resolve_project, ClientCommand,
        ProjectCommand,
    };

    #[tokio::test]
    async fn test_add_project_with_client_rate() -> Result<()> {
        let dir = tempdir()?;
        let app = App::open(dir.path(), Arc::new(ManualClock::new())).await?;

        process_client_command(
            &app,
            ClientCommand::Add {
                name: "Acme".into(),
                rate: 85.,
                color: "#ff9500".into(),
            },
        )
        .await?;
        process_project_command(
            &app,
            ProjectCommand::Add {
                name: " Rebrand ".into(),
                rate: None,
                client: Some("acme".into()),
            },
        )
        .await?;

        let clients = app.records.fetch(Query::<Client>::all()).await?;
        assert_eq!(clients[0].color_hex, "FF9500");
        let project = resolve_project(&app.records, "rebrand").await?;
        assert_eq!(project.name, "Rebrand");
        assert_eq!(project.hourly_rate, 85.);
        assert_eq!(project.client_id, Some(clients[0].id));

        let duplicate = process_project_command(
            &app,
            ProjectCommand::Add {
                name: "REBRAND".into(),
                rate: Some(10.),
                client: None,
            },
        )
        .await;
        assert!(duplicate.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_by_id_prefix() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new();
        let app = App::open(dir.path(), Arc::new(clock.clone())).await?;
        let project = Project::new("Website".into(), 50., None, clock.time());
        app.records.insert(project.clone()).await?;

        let prefix = project.id.to_string()[..6].to_string();
        assert_eq!(resolve_project(&app.records, &prefix).await?, project);
        assert!(resolve_project(&app.records, "missing").await.is_err());
        assert!(resolve_project(&app.records, "").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_removes_entries_and_discards_running_timer() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new();
        let mut app = App::open(dir.path(), Arc::new(clock.clone())).await?;
        let project = Project::new("Website".into(), 50., None, clock.time());
        let mut entry = TimeEntry::new(project.id, clock.time(), String::new());
        entry.end_time = Some(clock.time() + Duration::hours(1));
        app.records.insert(project.clone()).await?;
        app.records.insert(entry).await?;
        app.records.save().await?;

        app.billable.start(project.clone(), "").await;
        clock.advance(Duration::minutes(5));
        process_project_command(
            &app,
            ProjectCommand::Delete {
                project: "website".into(),
            },
        )
        .await?;

        assert!(app.records.fetch(Query::<TimeEntry>::all()).await?.is_empty());
        assert_eq!(app.billable.stop().await, None);
        assert!(app.records.fetch(Query::<TimeEntry>::all()).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_archive_keeps_project() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new();
        let app = App::open(dir.path(), Arc::new(clock.clone())).await?;
        app.records
            .insert(Project::new("Old".into(), 50., None, clock.time()))
            .await?;

        process_project_command(
            &app,
            ProjectCommand::Archive {
                project: "old".into(),
            },
        )
        .await?;
        assert!(resolve_project(&app.records, "old").await?.is_archived);
        Ok(())
    }
}
