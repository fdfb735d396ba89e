mod commands;
mod config;
mod simple_md;
mod view;

use agent_host::{export, Attachment, Conversation, TurnEvent};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use commands::Command;
use providers::{ChatBackend, GeminiClient};
use shared::personas;
use shared::settings::AppSettings;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use view::TerminalView;

#[derive(Parser, Debug)]
#[command(name = "ecoiuris", version)]
#[command(about = "EcoIuris AI - legal research assistant for the terminal", long_about = None)]
struct Args {
    /// Persona to start with (see /personas)
    #[arg(long)]
    persona: Option<String>,
    /// Gemini model for chat turns
    #[arg(long)]
    model: Option<String>,
    /// Settings file (defaults to the per-user config directory)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory exported transcripts are written to
    #[arg(long)]
    export_dir: Option<PathBuf>,
    /// Show the welcome banner at once instead of typing it out
    #[arg(long)]
    no_animation: bool,
}

struct Repl {
    conv: Conversation,
    view: TerminalView,
    export_dir: PathBuf,
    animate: bool,
    events_tx: UnboundedSender<TurnEvent>,
}

impl Repl {
    fn redraw(&mut self) -> Result<()> {
        let mut out = io::stdout().lock();
        self.view.sync(&self.conv, &mut out)?;
        Ok(())
    }

    fn notice(&self, text: &str) -> Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", text.bright_black())?;
        Ok(())
    }

    fn status(&self) -> Result<()> {
        self.notice(&view::status_line(&self.conv))
    }

    fn dispatch(&mut self, text: &str) -> Result<()> {
        if self.conv.is_sending() {
            return self.notice("Still waiting for the previous reply.");
        }
        if self.conv.init_error().is_some() {
            return self.notice("No chat session. Switch persona with /persona <key> to retry.");
        }
        if let Some(job) = self.conv.begin_send(text) {
            debug!(deep = job.is_deep_search(), "dispatching turn");
            tokio::spawn(job.run(self.events_tx.clone()));
            self.redraw()?;
        }
        Ok(())
    }

    fn switch_persona(&mut self, key: &str) -> Result<()> {
        match self.conv.select_persona(key) {
            Ok(true) => {
                if !self.animate {
                    self.conv.finish_welcome();
                }
                self.redraw()
            }
            Ok(false) => self.notice(&format!("Unknown persona '{}'. Try /personas.", key)),
            // the view prints the initialization error under the new heading
            Err(_) => self.redraw(),
        }
    }

    fn list_personas(&self) -> Result<()> {
        let mut out = io::stdout().lock();
        for p in personas::PERSONAS.iter() {
            let marker = if p.key == self.conv.persona().key { "*" } else { " " };
            writeln!(out, "{} {:<10} {}", marker, p.key.cyan(), p.display_name)?;
        }
        Ok(())
    }

    fn export(&self) -> Result<()> {
        match export::write_transcript(&self.export_dir, self.conv.transcript(), Utc::now()) {
            Ok(path) => self.notice(&format!("Conversation saved to {}", path.display())),
            Err(e) => {
                eprintln!("{}", e.to_string().red());
                Ok(())
            }
        }
    }

    /// Returns false when the user asked to quit.
    fn handle_line(&mut self, line: &str) -> Result<bool> {
        match commands::parse(line) {
            Command::Send(text) => self.dispatch(&text)?,
            Command::Persona(key) => self.switch_persona(&key)?,
            Command::Personas => self.list_personas()?,
            Command::Attach(path) => match Attachment::from_path(&path) {
                Ok(att) => {
                    self.conv.attach(att);
                    self.status()?;
                }
                Err(e) => eprintln!("{}", e.to_string().red()),
            },
            Command::Detach => {
                if self.conv.discard_attachment().is_none() {
                    self.notice("Nothing attached.")?;
                }
                self.status()?;
            }
            Command::Deep(None) => {
                let on = !self.conv.deep_search_requested();
                self.conv.set_deep_search(on);
                self.status()?;
            }
            Command::Deep(Some(query)) => {
                if self.conv.can_send() {
                    self.conv.set_deep_search(true);
                }
                self.dispatch(&query)?;
            }
            Command::Export => self.export()?,
            Command::Help => println!("{}", commands::HELP),
            Command::Quit => return Ok(false),
            Command::Unknown(cmd) => {
                self.notice(&format!("Unknown command {}. Type /help.", cmd))?
            }
        }
        Ok(true)
    }
}

async fn run(backend: Arc<dyn ChatBackend>, settings: AppSettings, animate: bool) -> Result<()> {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut repl = Repl {
        conv: Conversation::new(backend, &settings.default_persona),
        view: TerminalView::new(),
        export_dir: config::export_dir(&settings),
        animate,
        events_tx,
    };
    if !animate {
        repl.conv.finish_welcome();
    }
    repl.redraw()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = interval(Duration::from_millis(settings.welcome_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => {
                    if !repl.handle_line(&line)? {
                        break;
                    }
                }
                None => stdin_open = false,
            },
            Some(event) = events_rx.recv() => {
                if repl.conv.apply(event) {
                    repl.redraw()?;
                    if !repl.conv.is_sending() {
                        repl.status()?;
                    }
                }
            }
            _ = ticker.tick(), if repl.conv.is_animating() => {
                let token = repl.conv.token();
                repl.conv.tick_welcome(token);
                repl.redraw()?;
            }
        }
        // piped input: let the last reply finish before exiting
        if !stdin_open && !repl.conv.is_sending() {
            break;
        }
    }

    info!("session ended");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut settings = config::load_settings(args.config.as_deref())?;
    config::Overrides {
        persona: args.persona,
        model: args.model,
        export_dir: args.export_dir,
    }
    .apply(&mut settings);

    let client = GeminiClient::from_auth(
        &settings.gemini_model,
        &settings.search_model,
        &settings.gemini_auth,
    )
    .context("failed to set up the Gemini client")?;
    info!(model = %settings.gemini_model, persona = %settings.default_persona, "starting");

    run(Arc::new(client), settings, !args.no_animation).await
}
