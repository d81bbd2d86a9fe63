// ! Built-in verb implementations
// !
// ! The runtime-owned verbs that operate on the application context. The
// ! shell handles `logs`, `clear`, and `exit` itself (they touch shell
// ! state); everything else lands here.

use crate::app::AppContext;
use crate::core::error::{HubError, HubResult};
use crate::dispatch::CLIENT_CLI;
use crate::plugin::{CommandOutput, PluginHelp};
use crate::commands::registry::{BUILTINS, find_builtin};
use serde_json::Value;
use std::collections::HashMap;

/// Dispatch one built-in by name
pub async fn run(ctx: &AppContext, name: &str, args: &[String]) -> HubResult<CommandOutput> {
    match name {
        "help" => cmd_help(ctx, args).await,
        "plugins" => cmd_plugins(ctx, args).await,
        "tools" => cmd_tools(ctx, args).await,
        "call" => cmd_call(ctx, args).await,
        "stats" => cmd_stats(ctx, args).await,
        "serve" => cmd_serve(ctx, args).await,
        "stop" => cmd_stop(ctx).await,
        other => Err(HubError::UnknownCommand(other.to_string())),
    }
}

async fn cmd_help(ctx: &AppContext, args: &[String]) -> HubResult<CommandOutput> {
    let Some(topic) = args.first() else {
        let mut out = String::from("Built-in commands:\n");
        for spec in BUILTINS {
            out.push_str(&format!("  {:<42} {}\n", spec.usage, spec.description));
        }

        let plugin_commands = ctx.manager.get_cli_commands().await;
        if !plugin_commands.is_empty() {
            out.push_str("\nPlugin commands:\n");
            for command in plugin_commands {
                out.push_str(&format!(
                    "  {:<20} [{}] {}\n",
                    command.spec.name, command.plugin, command.spec.description
                ));
            }
        }
        out.push_str("\nUse 'help <topic>' for details on a command or plugin.");
        return Ok(CommandOutput::ok(out));
    };

    if let Some(spec) = find_builtin(topic) {
        return Ok(CommandOutput::ok(format!(
            "{}\n  usage: {}",
            spec.description, spec.usage
        )));
    }

    if ctx.manager.is_loaded(topic).await {
        let help = ctx.manager.help(topic).await?;
        return Ok(CommandOutput::ok(format_plugin_help(topic, &help)));
    }

    Ok(CommandOutput::fail(format!("No help available for '{topic}'")))
}

fn format_plugin_help(name: &str, help: &PluginHelp) -> String {
    let mut out = format!("[{name}] {}\n", help.summary);
    if !help.commands.is_empty() {
        out.push_str("\nCommands:\n");
        for entry in &help.commands {
            out.push_str(&format!("  {:<14} {}\n", entry.name, entry.description));
        }
    }
    if !help.tools.is_empty() {
        out.push_str("\nTools:\n");
        for entry in &help.tools {
            out.push_str(&format!("  {:<14} {}\n", entry.name, entry.description));
        }
    }
    out.trim_end().to_string()
}

async fn cmd_plugins(ctx: &AppContext, args: &[String]) -> HubResult<CommandOutput> {
    match args {
        [] => list_plugins(ctx).await,
        [action] if action == "list" => list_plugins(ctx).await,
        [action, name] if action == "enable" => {
            ctx.manager.enable_plugin(name).await?;
            Ok(CommandOutput::ok(format!("Plugin '{name}' enabled")))
        }
        [action, name] if action == "disable" => {
            ctx.manager.disable_plugin(name).await?;
            Ok(CommandOutput::ok(format!("Plugin '{name}' disabled")))
        }
        _ => Ok(CommandOutput::fail(
            "usage: plugins [list|enable|disable] [name]",
        )),
    }
}

async fn list_plugins(ctx: &AppContext) -> HubResult<CommandOutput> {
    let summaries = ctx.manager.plugins().await;
    if summaries.is_empty() {
        return Ok(CommandOutput::ok("No plugins loaded"));
    }

    let mut out = String::new();
    for summary in summaries {
        let state = if summary.enabled { "enabled" } else { "disabled" };
        out.push_str(&format!(
            "{} v{} [{}] ({}) {} - {}\n",
            summary.name,
            summary.manifest.version,
            state,
            summary.status.indicator,
            summary.status.text,
            summary.manifest.description
        ));
    }
    Ok(CommandOutput::ok(out.trim_end()))
}

async fn cmd_tools(ctx: &AppContext, args: &[String]) -> HubResult<CommandOutput> {
    match args {
        [] => list_visible_tools(ctx).await,
        [action] if action == "list" => list_visible_tools(ctx).await,
        [action, plugin] if action == "list" => {
            let inventory = ctx.manager.tool_inventory(plugin).await?;
            if inventory.is_empty() {
                return Ok(CommandOutput::ok(format!("Plugin '{plugin}' has no tools")));
            }
            let mut out = String::new();
            for (spec, masked) in inventory {
                let mark = if masked { " [disabled]" } else { "" };
                out.push_str(&format!(
                    "{plugin}_{}{mark} - {}\n",
                    spec.name, spec.description
                ));
            }
            Ok(CommandOutput::ok(out.trim_end()))
        }
        [action, plugin, tool] if action == "enable" => {
            ctx.manager.enable_tool(plugin, tool).await?;
            Ok(CommandOutput::ok(format!("Tool '{plugin}_{tool}' enabled")))
        }
        [action, plugin, tool] if action == "disable" => {
            ctx.manager.disable_tool(plugin, tool).await?;
            Ok(CommandOutput::ok(format!("Tool '{plugin}_{tool}' disabled")))
        }
        _ => Ok(CommandOutput::fail(
            "usage: tools [list|enable|disable] [plugin] [tool]",
        )),
    }
}

async fn list_visible_tools(ctx: &AppContext) -> HubResult<CommandOutput> {
    let tools = ctx.manager.get_tools().await;
    if tools.is_empty() {
        return Ok(CommandOutput::ok("No tools available"));
    }
    let mut out = String::new();
    for tool in tools {
        out.push_str(&format!("{} - {}\n", tool.qualified_name, tool.spec.description));
    }
    Ok(CommandOutput::ok(out.trim_end()))
}

async fn cmd_call(ctx: &AppContext, args: &[String]) -> HubResult<CommandOutput> {
    let [plugin, tool, rest @ ..] = args else {
        return Ok(CommandOutput::fail("usage: call <plugin> <tool> [key=value ...]"));
    };

    let mut arguments: HashMap<String, Value> = HashMap::new();
    for pair in rest {
        let Some((key, raw)) = pair.split_once('=') else {
            return Ok(CommandOutput::fail(format!(
                "argument '{pair}' is not of the form key=value"
            )));
        };
        // JSON values decode; anything else stays a raw string
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        arguments.insert(key.to_string(), value);
    }

    let result = ctx
        .dispatcher
        .call_tool(CLIENT_CLI, &format!("{plugin}_{tool}"), Some(arguments))
        .await;

    Ok(CommandOutput {
        output: result.joined_text(),
        success: !result.is_error.unwrap_or(false),
    })
}

async fn cmd_stats(ctx: &AppContext, args: &[String]) -> HubResult<CommandOutput> {
    match args {
        [] => {
            let stats = ctx.telemetry.stats();
            let mut out = format!(
                "Since {}\nTotal: {} calls ({} ok, {} errors), {} ms, {} B in, {} B out\n",
                stats.since.format("%Y-%m-%d %H:%M:%S UTC"),
                stats.totals.calls,
                stats.totals.success,
                stats.totals.errors,
                stats.totals.total_duration_ms,
                stats.totals.total_request_bytes,
                stats.totals.total_response_bytes,
            );
            for (tool, stat) in &stats.tools {
                out.push_str(&format!(
                    "  {tool}: {} calls, {} errors, {} ms\n",
                    stat.calls, stat.errors, stat.total_duration_ms
                ));
            }
            Ok(CommandOutput::ok(out.trim_end()))
        }
        [action] if action == "reset" => {
            ctx.telemetry.reset_stats();
            Ok(CommandOutput::ok("Statistics reset"))
        }
        [tool] => {
            let stats = ctx.telemetry.stats();
            let Some(stat) = stats.tools.get(tool.as_str()) else {
                return Ok(CommandOutput::fail(format!("No statistics for tool '{tool}'")));
            };
            let last_used = stat
                .last_used
                .map(|when| when.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "never".to_string());
            Ok(CommandOutput::ok(format!(
                "{tool}: {} calls ({} ok, {} errors), {} ms total, \
                 {} B in, {} B out, last used {last_used}",
                stat.calls,
                stat.success,
                stat.errors,
                stat.total_duration_ms,
                stat.total_request_bytes,
                stat.total_response_bytes,
            )))
        }
        _ => Ok(CommandOutput::fail("usage: stats [<tool>|reset]")),
    }
}

async fn cmd_serve(ctx: &AppContext, args: &[String]) -> HubResult<CommandOutput> {
    let port = match args.first() {
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                return Ok(CommandOutput::fail(format!("'{raw}' is not a valid port")));
            }
        },
        None => None,
    };

    let addr = ctx.start_sse(port).await?;
    Ok(CommandOutput::ok(format!("SSE server listening on {addr}")))
}

async fn cmd_stop(ctx: &AppContext) -> HubResult<CommandOutput> {
    if ctx.stop_sse().await {
        Ok(CommandOutput::ok("SSE server stopped"))
    } else {
        Ok(CommandOutput::ok("SSE server is not running"))
    }
}
