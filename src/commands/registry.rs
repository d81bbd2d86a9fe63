// ! CLI verb registry and collision-safe resolution
// !
// ! Resolution order for a verb: built-ins first (case-insensitive, aliases
// ! included), then plugin verbs. A verb claimed by one plugin routes
// ! directly; a verb claimed by several becomes a router verb whose first
// ! positional argument selects the plugin. Plugin verbs that would shadow a
// ! built-in are refused; the built-in stays authoritative. All plugin-verb
// ! state is recomputed from the manager, so unload transitions (router →
// ! direct → gone) are observable through the same queries autocomplete uses.

use crate::plugin::{PluginManager, RegisteredCommand};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// A built-in verb owned by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub description: &'static str,
    pub usage: &'static str,
}

impl BuiltinSpec {
    fn matches(&self, verb: &str) -> bool {
        self.name.eq_ignore_ascii_case(verb)
            || self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(verb))
    }
}

/// The fixed set of verbs the runtime owns
pub const BUILTINS: &[BuiltinSpec] = &[
    BuiltinSpec {
        name: "help",
        aliases: &["?"],
        description: "Show available commands or details on one topic",
        usage: "help [topic]",
    },
    BuiltinSpec {
        name: "plugins",
        aliases: &[],
        description: "List, enable, or disable plugins",
        usage: "plugins [list|enable|disable] [name]",
    },
    BuiltinSpec {
        name: "tools",
        aliases: &[],
        description: "List, enable, or disable tools",
        usage: "tools [list|enable|disable] [plugin] [tool]",
    },
    BuiltinSpec {
        name: "call",
        aliases: &[],
        description: "Invoke a tool with key=value arguments",
        usage: "call <plugin> <tool> [key=value ...]",
    },
    BuiltinSpec {
        name: "logs",
        aliases: &[],
        description: "Show or follow recent tool calls",
        usage: "logs [on|off|clear|<count>]",
    },
    BuiltinSpec {
        name: "stats",
        aliases: &[],
        description: "Show aggregated call statistics",
        usage: "stats [<tool>|reset]",
    },
    BuiltinSpec {
        name: "serve",
        aliases: &[],
        description: "Start the SSE server",
        usage: "serve [port]",
    },
    BuiltinSpec {
        name: "stop",
        aliases: &[],
        description: "Stop the SSE server",
        usage: "stop",
    },
    BuiltinSpec {
        name: "clear",
        aliases: &[],
        description: "Clear the screen",
        usage: "clear",
    },
    BuiltinSpec {
        name: "exit",
        aliases: &["quit"],
        description: "Leave the interactive shell",
        usage: "exit",
    },
];

/// Look up a built-in by name or alias
pub fn find_builtin(verb: &str) -> Option<&'static BuiltinSpec> {
    BUILTINS.iter().find(|spec| spec.matches(verb))
}

/// Outcome of resolving one input line
#[derive(Debug)]
pub enum Resolution {
    /// Blank input; a successful no-op
    Empty,
    /// A runtime-owned verb
    Builtin {
        spec: &'static BuiltinSpec,
        args: Vec<String>,
    },
    /// A verb routed to exactly one plugin
    Plugin {
        command: RegisteredCommand,
        args: Vec<String>,
    },
    /// A router verb invoked without a valid plugin selector
    Ambiguous {
        verb: String,
        claimants: Vec<String>,
    },
    /// No built-in and no plugin claims the verb
    Unknown { verb: String },
}

/// Resolves verbs against the built-ins and the live plugin set
pub struct CommandRegistry {
    manager: Arc<PluginManager>,
}

impl CommandRegistry {
    pub fn new(manager: Arc<PluginManager>) -> Self {
        Self { manager }
    }

    /// Split an input line into tokens
    ///
    /// Single- and double-quoted spans group words; the quotes themselves
    /// are stripped. There is no escape character.
    pub fn tokenize(line: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut quote: Option<char> = None;
        let mut in_token = false;

        for ch in line.chars() {
            match quote {
                Some(open) if ch == open => quote = None,
                Some(_) => current.push(ch),
                None => match ch {
                    '\'' | '"' => {
                        quote = Some(ch);
                        in_token = true;
                    }
                    c if c.is_whitespace() => {
                        if in_token || !current.is_empty() {
                            tokens.push(std::mem::take(&mut current));
                            in_token = false;
                        }
                    }
                    c => {
                        current.push(c);
                        in_token = true;
                    }
                },
            }
        }
        if in_token || !current.is_empty() {
            tokens.push(current);
        }
        tokens
    }

    /// Resolve a tokenized line
    pub async fn resolve(&self, tokens: Vec<String>) -> Resolution {
        let mut tokens = tokens.into_iter();
        let Some(verb) = tokens.next() else {
            return Resolution::Empty;
        };
        let args: Vec<String> = tokens.collect();

        if let Some(spec) = find_builtin(&verb) {
            return Resolution::Builtin { spec, args };
        }

        let mut claims = self.claims_for(&verb).await;
        match claims.len() {
            0 => Resolution::Unknown { verb },
            1 => Resolution::Plugin {
                command: claims.remove(0),
                args,
            },
            _ => {
                // Router verb: the first positional argument names the plugin
                let claimants: Vec<String> =
                    claims.iter().map(|claim| claim.plugin.clone()).collect();
                if let Some((selector, rest)) = args.split_first() {
                    if let Some(command) =
                        claims.into_iter().find(|claim| claim.plugin == *selector)
                    {
                        return Resolution::Plugin {
                            command,
                            args: rest.to_vec(),
                        };
                    }
                }
                Resolution::Ambiguous { verb, claimants }
            }
        }
    }

    /// Plugins claiming a verb, with built-in shadowing filtered out
    async fn claims_for(&self, verb: &str) -> Vec<RegisteredCommand> {
        self.plugin_verbs()
            .await
            .remove(verb)
            .unwrap_or_default()
    }

    /// All plugin verbs grouped by name, minus those shadowing built-ins
    async fn plugin_verbs(&self) -> BTreeMap<String, Vec<RegisteredCommand>> {
        let mut verbs: BTreeMap<String, Vec<RegisteredCommand>> = BTreeMap::new();
        for command in self.manager.get_cli_commands().await {
            if find_builtin(&command.spec.name).is_some() {
                warn!(
                    plugin = %command.plugin,
                    verb = %command.spec.name,
                    "plugin verb shadows a built-in and is ignored"
                );
                continue;
            }
            verbs.entry(command.spec.name.clone()).or_default().push(command);
        }
        verbs
    }

    /// Verbs offered to the line editor for completion
    ///
    /// Built-ins plus plugin verbs; a router verb appears once.
    pub async fn completions(&self) -> Vec<String> {
        let mut names: Vec<String> = BUILTINS.iter().map(|spec| spec.name.to_string()).collect();
        names.extend(self.plugin_verbs().await.into_keys());
        names.sort();
        names.dedup();
        names
    }
}
