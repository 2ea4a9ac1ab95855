//! Interactive session over the store and orchestrator.
//!
//! A thin line-oriented shell: every command maps onto one store or
//! orchestrator operation and renders the returned state. All decisions
//! live in `awry-core`.

use anyhow::Result;
use awry_core::{AwryError, ConfigStore, QueryOrchestrator};
use awry_types::{DbType, Profile, ProfileDraft, ResultEntry};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

const HELP: &str = "\
Commands:
  list                 show stored profiles
  new                  start a new profile draft
  edit <id>            load a stored profile into the draft
  set <field> <value>  set a draft field (db, conn, model, cli, knowledge)
  save                 validate and persist the draft
  delete <id>          remove a stored profile
  connect <id>         connect and make the profile active
  ask <question>       question -> data via the model
  sql <question>       question -> generated statement (staged, not run)
  query [statement]    run a SELECT statement (default: the staged one)
  history              show this session's results
  quit                 leave";

pub struct Session {
    store: Arc<ConfigStore>,
    orchestrator: Arc<QueryOrchestrator>,
}

impl Session {
    pub fn new(store: Arc<ConfigStore>, orchestrator: Arc<QueryOrchestrator>) -> Self {
        Self {
            store,
            orchestrator,
        }
    }

    pub async fn run(&self) -> Result<()> {
        println!("awry - type 'help' for commands");

        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();

        loop {
            self.prompt();
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if matches!(line, "quit" | "exit") {
                break;
            }

            if let Err(e) = self.dispatch(line).await {
                println!("Error: {}", render_error(&e));
            }
        }

        Ok(())
    }

    fn prompt(&self) {
        match self.store.active() {
            Some(p) => print!("awry [{}]> ", p.db_type),
            None => print!("awry [disconnected]> "),
        }
        let _ = std::io::stdout().flush();
    }

    async fn dispatch(&self, line: &str) -> awry_core::Result<()> {
        let (cmd, rest) = split_command(line);
        debug!(target: "awry::session", "command: {}", cmd);

        match cmd {
            "help" => println!("{HELP}"),
            "list" => self.list(),
            "new" => self.new_draft(),
            "edit" => self.edit(rest),
            "set" => self.set_field(rest),
            "save" => self.save()?,
            "delete" => {
                if let Some(id) = parse_id(rest) {
                    self.store.delete(id)?;
                    println!("Profile {id} deleted.");
                }
            }
            "connect" => {
                if let Some(profile) = self.lookup(rest) {
                    self.orchestrator.connect(profile.clone()).await?;
                    println!("Connected to {}.", profile.db_type);
                }
            }
            "ask" => {
                let entry = self.orchestrator.ask(rest).await?;
                print_entry(&entry);
            }
            "sql" => {
                let entry = self.orchestrator.ask_for_sql(rest).await?;
                print_entry(&entry);
                println!("Staged for `query`: {}", entry.sql);
            }
            "query" => {
                let statement = if rest.is_empty() {
                    self.orchestrator.pending_sql().unwrap_or_default()
                } else {
                    rest.to_string()
                };
                let entry = self.orchestrator.query(&statement).await?;
                print_entry(&entry);
            }
            "history" => {
                for entry in self.orchestrator.history() {
                    println!("--- {}", entry.created_at.format("%H:%M:%S"));
                    print_entry(&entry);
                }
            }
            _ => println!("Unknown command '{cmd}'; try 'help'."),
        }
        Ok(())
    }

    fn list(&self) {
        let profiles = self.store.profiles();
        if profiles.is_empty() {
            println!("No profiles stored; start with 'new'.");
            return;
        }
        for p in profiles {
            println!("  {} {} {}", p.id, p.db_type, p.connection_string);
        }
    }

    fn new_draft(&self) {
        let mut draft = ProfileDraft::new();
        // The last-used model path is the default for new profiles.
        let model_path = self.store.model_path();
        if !model_path.is_empty() {
            draft.ai_model_path = Some(model_path);
        }
        self.store.set_edit_buffer(draft);
        println!("Draft started; use 'set' then 'save'.");
    }

    fn edit(&self, rest: &str) {
        let Some(profile) = self.lookup(rest) else {
            return;
        };
        self.store.set_edit_buffer(profile.into());
        println!("Editing; use 'set' then 'save'.");
    }

    fn set_field(&self, rest: &str) {
        let Some(mut draft) = self.store.edit_buffer() else {
            println!("No draft; use 'new' or 'edit <id>' first.");
            return;
        };
        let (field, value) = split_command(rest);
        match field {
            "db" => match parse_db_type(value) {
                Some(db_type) => draft.db_type = Some(db_type),
                None => {
                    println!("Unknown database type '{value}'; use MySQL, PostgreSQL or SQLite.");
                    return;
                }
            },
            "conn" => draft.connection_string = Some(value.to_string()),
            "model" => draft.ai_model_path = Some(value.to_string()),
            "cli" => draft.ai_cli_path = Some(value.to_string()),
            "knowledge" => draft.sql_knowledge = Some(value.to_string()),
            _ => {
                println!("Unknown field '{field}'; use db, conn, model, cli or knowledge.");
                return;
            }
        }
        self.store.set_edit_buffer(draft);
    }

    fn save(&self) -> awry_core::Result<()> {
        let Some(draft) = self.store.edit_buffer() else {
            println!("No draft; use 'new' or 'edit <id>' first.");
            return Ok(());
        };
        match self.store.save(draft)? {
            Some(profile) => println!("Saved profile {}.", profile.id),
            None => println!("The profile being edited no longer exists."),
        }
        Ok(())
    }

    fn lookup(&self, rest: &str) -> Option<Profile> {
        let id = parse_id(rest)?;
        let profile = self.store.get(id);
        if profile.is_none() {
            println!("No profile with id {id}.");
        }
        profile
    }
}

fn split_command(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    }
}

fn parse_id(rest: &str) -> Option<u64> {
    match rest.parse() {
        Ok(id) => Some(id),
        Err(_) => {
            println!("Expected a profile id, got '{rest}'.");
            None
        }
    }
}

fn parse_db_type(value: &str) -> Option<DbType> {
    match value.to_lowercase().as_str() {
        "mysql" => Some(DbType::MySql),
        "postgresql" | "postgres" => Some(DbType::PostgreSql),
        "sqlite" => Some(DbType::Sqlite),
        _ => None,
    }
}

fn render_error(e: &AwryError) -> String {
    match e {
        // The structured backend fields flatten only here, at the edge.
        AwryError::Backend(backend) => backend.diagnostic(),
        other => other.to_string(),
    }
}

fn print_entry(entry: &ResultEntry) {
    if !entry.question.is_empty() {
        println!("Question: {}", entry.question);
    }
    if !entry.sql.is_empty() {
        println!("SQL: {}", entry.sql);
    }
    if let Some(err) = &entry.err {
        println!("Backend error: {} ({})", err, entry.msg.as_deref().unwrap_or(""));
    }
    if let Some(rows) = &entry.data {
        for row in rows {
            println!("  {}", serde_json::Value::Object(row.clone()));
        }
        println!("{} rows.", rows.len());
    }
}
