// ! Interactive shell core
// !
// ! Executes input lines against the command registry: built-ins, direct
// ! plugin verbs (output prefixed with the plugin name), and router verbs.
// ! Handler failures are caught here and surfaced as failed results; the
// ! process never dies because of a command. The shell is the API surface
// ! the terminal UI consumes, it does no rendering of its own.

use crate::app::AppContext;
use crate::commands::builtins;
use crate::commands::registry::{BuiltinSpec, CommandRegistry, Resolution};
use crate::core::error::{HubError, HubResult};
use crate::plugin::CommandOutput;
use crate::telemetry::{SubscriptionId, ToolCallLog};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type LogSink = Arc<dyn Fn(&ToolCallLog) + Send + Sync>;

/// Line executor over one application context
pub struct Shell {
    ctx: Arc<AppContext>,
    registry: CommandRegistry,
    running: AtomicBool,
    logs_subscription: Mutex<Option<SubscriptionId>>,
    log_sink: LogSink,
}

impl Shell {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let registry = CommandRegistry::new(ctx.manager.clone());
        Self {
            ctx,
            registry,
            running: AtomicBool::new(true),
            logs_subscription: Mutex::new(None),
            log_sink: Arc::new(|entry: &ToolCallLog| println!("{}", format_log_entry(entry))),
        }
    }

    /// Replace where `logs on` streams entries (the UI hook)
    pub fn with_log_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&ToolCallLog) + Send + Sync + 'static,
    {
        self.log_sink = Arc::new(sink);
        self
    }

    /// False once `exit` has run
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    /// Execute one input line
    pub async fn execute(&self, line: &str) -> CommandOutput {
        let tokens = CommandRegistry::tokenize(line);
        match self.registry.resolve(tokens).await {
            Resolution::Empty => CommandOutput::ok(""),
            Resolution::Builtin { spec, args } => self
                .run_builtin(spec, &args)
                .await
                .unwrap_or_else(|err| CommandOutput::fail(err.to_string())),
            Resolution::Plugin { command, args } => {
                match command.spec.handler.run(args).await {
                    Ok(result) => CommandOutput {
                        output: format!("[{}] {}", command.plugin, result.output),
                        success: result.success,
                    },
                    Err(err) => {
                        CommandOutput::fail(format!("[{}] {err}", command.plugin))
                    }
                }
            }
            Resolution::Ambiguous { verb, claimants } => CommandOutput::fail(format!(
                "Command '{verb}' is provided by multiple plugins: {}. \
                 Use '{verb} <plugin> [args]' to pick one.",
                claimants.join(", ")
            )),
            Resolution::Unknown { verb } => {
                CommandOutput::fail(HubError::UnknownCommand(verb).to_string())
            }
        }
    }

    async fn run_builtin(&self, spec: &BuiltinSpec, args: &[String]) -> HubResult<CommandOutput> {
        match spec.name {
            "logs" => self.cmd_logs(args),
            "clear" => Ok(CommandOutput::ok("\x1b[2J\x1b[H")),
            "exit" => {
                self.running.store(false, Ordering::SeqCst);
                Ok(CommandOutput::ok(""))
            }
            other => builtins::run(&self.ctx, other, args).await,
        }
    }

    fn cmd_logs(&self, args: &[String]) -> HubResult<CommandOutput> {
        match args {
            [] => Ok(self.render_recent(20)),
            [action] if action == "on" => {
                let mut subscription = self
                    .logs_subscription
                    .lock()
                    .expect("subscription lock poisoned");
                if subscription.is_none() {
                    let sink = self.log_sink.clone();
                    *subscription = Some(self.ctx.telemetry.subscribe(move |entry| sink(entry)));
                }
                Ok(CommandOutput::ok("Log streaming enabled"))
            }
            [action] if action == "off" => {
                let subscription = self
                    .logs_subscription
                    .lock()
                    .expect("subscription lock poisoned")
                    .take();
                if let Some(id) = subscription {
                    self.ctx.telemetry.unsubscribe(id);
                }
                Ok(CommandOutput::ok("Log streaming disabled"))
            }
            [action] if action == "clear" => {
                self.ctx.telemetry.clear_history();
                Ok(CommandOutput::ok("History cleared"))
            }
            [count] => match count.parse::<usize>() {
                Ok(count) => Ok(self.render_recent(count)),
                Err(_) => Ok(CommandOutput::fail("usage: logs [on|off|clear|<count>]")),
            },
            _ => Ok(CommandOutput::fail("usage: logs [on|off|clear|<count>]")),
        }
    }

    fn render_recent(&self, count: usize) -> CommandOutput {
        let entries = self.ctx.telemetry.recent(count);
        if entries.is_empty() {
            return CommandOutput::ok("No calls logged");
        }
        let lines: Vec<String> = entries.iter().map(format_log_entry).collect();
        CommandOutput::ok(lines.join("\n"))
    }
}

/// One-line rendering of a call log entry
pub fn format_log_entry(entry: &ToolCallLog) -> String {
    let outcome = if entry.success { "ok " } else { "ERR" };
    let mut line = format!(
        "{} {outcome} {} ({}) {}ms",
        entry.timestamp.format("%H:%M:%S"),
        entry.tool,
        entry.client_id,
        entry.duration_ms
    );
    if let Some(error) = &entry.error {
        line.push_str(" - ");
        line.push_str(error);
    }
    line
}
