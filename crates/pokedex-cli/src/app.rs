//! Application context and command handlers.
//!
//! `App` owns the cache-backed API client and the shared Pokédex state; every
//! command runs against it. Handlers return the text to print rather than
//! printing, so the REPL loop decides where output goes.

use anyhow::{bail, Context, Result};
use pokedex_core::models::Pokemon;
use pokedex_core::utils::{canonical_name, display_name, truncate_string};
use pokedex_core::{ApiClient, ApiError, AutoSaveSettings, SharedState, SyncOutcome};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Map,
    Next,
    Prev,
    Explore(String),
    Catch(String),
    Release(String),
    Evolve { name: String, choice: Option<String> },
    Inspect(String),
    Describe(String),
    ShowOff(String),
    Pokedex,
    Save,
    Reset { confirmed: bool },
    AutoSave(Option<String>),
    SaveInterval(Option<String>),
    Exit,
}

/// Longest unknown command echoed back in full.
const MAX_ECHOED_COMMAND: usize = 24;

/// Name, description pairs shown by `help`.
const HELP: &[(&str, &str)] = &[
    ("help", "List available commands"),
    ("map", "Show the first page of locations"),
    ("next", "Show the next page of locations"),
    ("prev", "Show the previous page of locations"),
    ("explore <n|area>", "List the Pokémon found at a location"),
    ("catch <name>", "Attempt to catch a Pokémon"),
    ("release <name>", "Release a caught Pokémon"),
    ("evolve <name> [n]", "Evolve a caught Pokémon, picking form n if there are several"),
    ("inspect <name>", "Show the stats of a caught Pokémon"),
    ("describe <name>", "Show the Pokédex entry of a caught Pokémon"),
    ("showoff <name>", "Have a caught Pokémon use one of its moves"),
    ("pokedex", "List every Pokémon you have caught"),
    ("save", "Save your Pokédex now"),
    ("reset confirm", "Release every Pokémon and start fresh"),
    ("autosave [on|off]", "Show or change automatic saving"),
    ("saveinterval [n]", "Show or change how many changes trigger a save"),
    ("exit", "Save and exit"),
];

impl Command {
    /// Parse one input line. Blank lines are `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let rest = words.collect::<Vec<_>>().join(" ");
        let arg = (!rest.is_empty()).then_some(rest);
        let required = |what: &str| arg.clone().with_context(|| format!("Usage: {} <{}>", name, what));

        let command = match name.to_lowercase().as_str() {
            "help" => Command::Help,
            "map" => Command::Map,
            "next" | "mapf" => Command::Next,
            "prev" | "mapb" => Command::Prev,
            "explore" => Command::Explore(required("location")?),
            "catch" => Command::Catch(required("pokemon")?),
            "release" => Command::Release(required("pokemon")?),
            "evolve" => {
                let arg = required("pokemon")?;
                match arg.split_once(' ') {
                    Some((name, choice)) => Command::Evolve {
                        name: name.to_string(),
                        choice: Some(choice.to_string()),
                    },
                    None => Command::Evolve {
                        name: arg,
                        choice: None,
                    },
                }
            }
            "inspect" => Command::Inspect(required("pokemon")?),
            "describe" => Command::Describe(required("pokemon")?),
            "showoff" => Command::ShowOff(required("pokemon")?),
            "pokedex" => Command::Pokedex,
            "save" => Command::Save,
            "reset" => Command::Reset {
                confirmed: arg.as_deref() == Some("confirm"),
            },
            "autosave" => Command::AutoSave(arg),
            "saveinterval" => Command::SaveInterval(arg),
            "exit" | "quit" => Command::Exit,
            other => bail!(
                "Unknown command: {} (type 'help' for a list)",
                truncate_string(other, MAX_ECHOED_COMMAND)
            ),
        };
        Ok(Some(command))
    }
}

/// Result of running one command.
#[derive(Debug, Default)]
pub struct Outcome {
    pub output: String,
    pub quit: bool,
}

impl Outcome {
    fn text(output: String) -> Self {
        Self {
            output,
            quit: false,
        }
    }
}

// ============================================================================
// App
// ============================================================================

pub struct App {
    api: ApiClient,
    state: SharedState,
}

impl App {
    pub fn new(api: ApiClient, state: SharedState) -> Self {
        Self { api, state }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub async fn execute(&self, command: Command) -> Result<Outcome> {
        debug!(?command, "Executing command");
        let output = match command {
            Command::Help => help(),
            Command::Map => self.show_locations(None).await?,
            Command::Next => self.page_locations(true).await?,
            Command::Prev => self.page_locations(false).await?,
            Command::Explore(target) => self.explore(&target).await?,
            Command::Catch(name) => {
                let roll = rand::thread_rng().gen_range(0..=u8::MAX);
                self.catch(&name, roll).await?
            }
            Command::Release(name) => self.release(&name)?,
            Command::Evolve { name, choice } => self.evolve(&name, choice.as_deref()).await?,
            Command::Inspect(name) => self.inspect(&name)?,
            Command::Describe(name) => self.describe(&name).await?,
            Command::ShowOff(name) => self.show_off(&name)?,
            Command::Pokedex => self.pokedex(),
            Command::Save => {
                self.state.save_now().context("Could not save Pokédex")?;
                "Pokédex saved successfully!\n".to_string()
            }
            Command::Reset { confirmed } => self.reset(confirmed)?,
            Command::AutoSave(arg) => self.auto_save(arg.as_deref())?,
            Command::SaveInterval(arg) => self.save_interval(arg.as_deref())?,
            Command::Exit => return Ok(self.exit()),
        };
        Ok(Outcome::text(output))
    }

    // ===== Map navigation =====

    async fn show_locations(&self, page_url: Option<String>) -> Result<String> {
        let page = self
            .api
            .fetch_location_areas(page_url.as_deref())
            .await
            .context("Could not load locations")?;

        let lines: Vec<String> = page
            .results
            .iter()
            .enumerate()
            .map(|(i, location)| format!("{}. {}", i + 1, display_name(&location.name)))
            .collect();

        self.state.with_write(|state| {
            state.next_location_url = page.next;
            state.prev_location_url = page.previous;
            state.recent_locations = page.results;
            state.map_viewed = true;
        });
        Ok(render(lines))
    }

    async fn page_locations(&self, forward: bool) -> Result<String> {
        let (viewed, url) = self.state.with_read(|state| {
            let url = if forward {
                state.next_location_url.clone()
            } else {
                state.prev_location_url.clone()
            };
            (state.map_viewed, url)
        });

        if !viewed {
            bail!("You need to use the 'map' command first to load locations");
        }
        match url {
            Some(url) => self.show_locations(Some(url)).await,
            None if forward => bail!("You're on the last page of locations"),
            None => bail!("You're on the first page of locations"),
        }
    }

    async fn explore(&self, target: &str) -> Result<String> {
        let area = match target.parse::<usize>() {
            Ok(n) => {
                let picked = self.state.with_read(|state| {
                    n.checked_sub(1)
                        .and_then(|i| state.recent_locations.get(i))
                        .map(|location| location.name.clone())
                });
                picked.with_context(|| {
                    format!("No location #{} on the current map page (use 'map' first)", n)
                })?
            }
            Err(_) => canonical_name(target),
        };

        let location = self
            .api
            .fetch_location_area(&area)
            .await
            .map_err(|e| not_found_as("location", &area, e))?;

        let mut lines = vec![
            format!("Exploring {}...", display_name(&area)),
            "Found Pokémon:".to_string(),
        ];
        lines.extend(
            location
                .pokemon_names()
                .map(|name| format!(" - {}", display_name(name))),
        );
        Ok(render(lines))
    }

    // ===== Pokédex changes =====

    /// Try to catch `name`; the catch succeeds when `roll` is below the
    /// species capture rate.
    pub async fn catch(&self, name: &str, roll: u8) -> Result<String> {
        let name = canonical_name(name);
        let species = self
            .api
            .fetch_species(&name)
            .await
            .map_err(|e| not_found_as("Pokémon", &name, e))?;

        let mut lines = vec![format!("Throwing a Pokéball at {}...", display_name(&name))];
        if roll >= species.capture_rate {
            lines.push(format!("{} escaped!", display_name(&name)));
            return Ok(render(lines));
        }

        let record = self
            .api
            .fetch_pokemon_record(&name)
            .await
            .map_err(|e| not_found_as("Pokémon", &name, e))?;
        self.state
            .with_write(|state| state.pokedex.insert(&name, record));
        lines.push(format!("{} was caught!", display_name(&name)));

        self.record_change(&mut lines);
        Ok(render(lines))
    }

    fn release(&self, name: &str) -> Result<String> {
        let Some((key, _)) = self.state.with_write(|state| state.pokedex.remove(name)) else {
            bail!("{} is not in your Pokédex", display_name(&canonical_name(name)));
        };

        let mut lines = vec![format!(
            "{} was released. Bye, {}!",
            display_name(&key),
            display_name(&key)
        )];
        self.record_change(&mut lines);
        Ok(render(lines))
    }

    /// Replace a caught Pokémon with its next evolution.
    ///
    /// With several possible forms and no `choice`, lists the forms and
    /// changes nothing. `choice` is a 1-based number or a form name.
    pub async fn evolve(&self, name: &str, choice: Option<&str>) -> Result<String> {
        let key = self.owned_key(name)?;
        let species = self
            .api
            .fetch_species(&key)
            .await
            .map_err(|e| not_found_as("Pokémon", &key, e))?;
        let chain = self
            .api
            .fetch_evolution_chain(&species)
            .await
            .context("Could not load evolution data")?;
        let options = chain.next_stages(&species.name).with_context(|| {
            format!("{} is missing from its evolution chain", display_name(&key))
        })?;

        let target = match (options.as_slice(), choice) {
            ([], _) => bail!("{} cannot evolve any further", display_name(&key)),
            ([only], _) => only.to_string(),
            (_, None) => {
                let mut lines = evolution_menu(&key, &options);
                lines.push(format!(
                    "Choose one with 'evolve {} <number>'",
                    key
                ));
                return Ok(render(lines));
            }
            (_, Some(choice)) => match pick_evolution(&options, choice) {
                Some(target) => target,
                None => bail!(
                    "Invalid selection: {}\n{}",
                    choice,
                    evolution_menu(&key, &options).join("\n")
                ),
            },
        };

        let record = self
            .api
            .fetch_pokemon_record(&target)
            .await
            .map_err(|e| not_found_as("Pokémon", &target, e))?;

        // Swap under one write lock so no reader sees both or neither.
        let swapped = self.state.with_write(|state| {
            if state.pokedex.remove(&key).is_none() {
                return false;
            }
            state.pokedex.insert(&target, record);
            true
        });
        if !swapped {
            bail!("{} was released before it could evolve", display_name(&key));
        }

        let mut lines = vec![
            format!("Evolving {} into {}...", display_name(&key), display_name(&target)),
            format!(
                "Congratulations! Your {} evolved into {}!",
                display_name(&key),
                display_name(&target)
            ),
        ];
        self.record_change(&mut lines);
        Ok(render(lines))
    }

    /// The change itself already happened; a failed save only gets a warning.
    fn record_change(&self, lines: &mut Vec<String>) {
        match self.state.record_change_and_maybe_sync() {
            Ok(SyncOutcome::Saved) => debug!("Auto-saved"),
            Ok(outcome) => debug!(?outcome, "Auto-save deferred"),
            Err(e) => {
                warn!(error = %e, "Auto-save failed");
                lines.push(format!("Warning: auto-save failed: {}", e));
                if e.is_retryable() {
                    lines.push(
                        "Another pokedexcli may be saving; try 'save' again shortly.".to_string(),
                    );
                }
            }
        }
    }

    fn reset(&self, confirmed: bool) -> Result<String> {
        if !confirmed {
            return Ok(
                "This releases every Pokémon and cannot be undone. Type 'reset confirm' to proceed.\n"
                    .to_string(),
            );
        }
        self.state.reset().context("Error saving empty Pokédex")?;
        Ok("Pokédex cleared! All Pokémon have been released.\n".to_string())
    }

    // ===== Pokédex views =====

    fn owned_key(&self, name: &str) -> Result<String> {
        let key = canonical_name(name);
        if !self.state.with_read(|state| state.pokedex.contains(&key)) {
            bail!("{} is not in your Pokédex", display_name(&key));
        }
        Ok(key)
    }

    fn caught(&self, name: &str) -> Result<Pokemon> {
        let record = self
            .state
            .with_read(|state| state.pokedex.get(name).cloned())
            .with_context(|| format!("You have not caught {}", display_name(&canonical_name(name))))?;
        Pokemon::from_record(&record).context("Stored record is not a Pokémon")
    }

    fn inspect(&self, name: &str) -> Result<String> {
        let pokemon = self.caught(name)?;

        let mut lines = vec![
            format!("Name: {}", display_name(&pokemon.name)),
            format!("Height: {}", pokemon.height),
            format!("Weight: {}", pokemon.weight),
            "Stats:".to_string(),
        ];
        lines.extend(
            pokemon
                .stats
                .iter()
                .map(|stat| format!("  -{}: {}", stat.stat.name, stat.base_stat)),
        );
        lines.push("Types:".to_string());
        lines.extend(pokemon.type_names().into_iter().map(|kind| format!("  - {}", kind)));
        Ok(render(lines))
    }

    /// Genus plus one English Pokédex entry picked at random.
    async fn describe(&self, name: &str) -> Result<String> {
        let key = self.owned_key(name)?;
        let species = self
            .api
            .fetch_species(&key)
            .await
            .map_err(|e| not_found_as("Pokémon", &key, e))?;

        let mut lines = vec![match species.genus() {
            Some(genus) => format!("{}, the {}", display_name(&key), genus),
            None => display_name(&key),
        }];
        if let Some(from) = &species.evolves_from_species {
            lines.push(format!("Evolves from {}", display_name(&from.name)));
        }

        let texts = species.flavor_texts();
        match texts.choose(&mut rand::thread_rng()) {
            Some((text, version)) => {
                lines.push(format!("\"{}\"", text));
                if let Some(version) = version {
                    lines.push(format!("(From Pokémon {})", display_name(version)));
                }
            }
            None => lines.push("No description available.".to_string()),
        }
        Ok(render(lines))
    }

    fn show_off(&self, name: &str) -> Result<String> {
        let pokemon = self.caught(name)?;
        let moves = pokemon.move_names();
        let Some(chosen) = moves.choose(&mut rand::thread_rng()) else {
            bail!("{} doesn't know any moves", display_name(&pokemon.name));
        };
        Ok(render(vec![format!(
            "{} used {}!",
            display_name(&pokemon.name),
            display_name(chosen)
        )]))
    }

    fn pokedex(&self) -> String {
        self.state.with_read(|state| {
            if state.pokedex.is_empty() {
                return "You have not caught any Pokémon yet\n".to_string();
            }
            let mut lines = vec!["Your Pokédex:".to_string()];
            lines.extend(state.pokedex.names().map(|name| format!(" - {}", display_name(name))));
            render(lines)
        })
    }

    // ===== Auto-save settings =====

    fn auto_save(&self, arg: Option<&str>) -> Result<String> {
        let current = self.state.with_read(|state| state.sync.settings);
        let enabled = match arg {
            None => {
                let status = if current.enabled { "enabled" } else { "disabled" };
                return Ok(format!("Auto-save is currently {}\n", status));
            }
            Some("on" | "true" | "1" | "enable" | "enabled") => true,
            Some("off" | "false" | "0" | "disable" | "disabled") => false,
            Some(other) => bail!("Invalid parameter: {} (use 'on' or 'off')", other),
        };

        self.state
            .set_auto_save(AutoSaveSettings::new(enabled, current.interval))
            .context("Could not save auto-save setting")?;
        Ok(if enabled {
            "Auto-save enabled. Your Pokédex will be saved automatically after changes.\n"
        } else {
            "Auto-save disabled. Use 'save' to save your Pokédex manually.\n"
        }
        .to_string())
    }

    fn save_interval(&self, arg: Option<&str>) -> Result<String> {
        let current = self.state.with_read(|state| state.sync.settings);
        let Some(raw) = arg else {
            return Ok(describe_interval("occurs", current.interval));
        };

        let interval = match raw.parse::<u32>() {
            Ok(n) if n >= 1 => n,
            _ => bail!("Invalid interval: {} (must be a positive number)", raw),
        };
        self.state
            .set_auto_save(AutoSaveSettings::new(current.enabled, interval))
            .context("Could not save auto-save interval")?;
        Ok(describe_interval("will occur", interval))
    }

    // ===== Shutdown =====

    fn exit(&self) -> Outcome {
        let mut output = match self.state.save_now() {
            Ok(()) => "Pokédex data saved!\n".to_string(),
            Err(e) => {
                warn!(error = %e, "Final save failed");
                format!("Warning: Could not save Pokédex data: {}\n", e)
            }
        };
        output.push_str("Thanks for using the Pokédex! See you next time!\n");
        Outcome { output, quit: true }
    }
}

/// Join output lines, ending with a newline.
fn render(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn help() -> String {
    let mut lines = vec![
        "Welcome to the Pokédex!".to_string(),
        "Usage:".to_string(),
        String::new(),
    ];
    lines.extend(
        HELP.iter()
            .map(|(name, description)| format!("{:<20} {}", name, description)),
    );
    render(lines)
}

fn evolution_menu(name: &str, options: &[&str]) -> Vec<String> {
    let mut lines = vec![format!("{} can evolve into multiple forms:", display_name(name))];
    lines.extend(
        options
            .iter()
            .enumerate()
            .map(|(i, option)| format!(" {}. {}", i + 1, display_name(option))),
    );
    lines
}

/// Resolve a 1-based number or a form name against `options`.
fn pick_evolution(options: &[&str], choice: &str) -> Option<String> {
    if let Ok(n) = choice.trim().parse::<usize>() {
        return n
            .checked_sub(1)
            .and_then(|i| options.get(i))
            .map(|option| option.to_string());
    }
    let wanted = canonical_name(choice);
    options
        .iter()
        .find(|option| option.eq_ignore_ascii_case(&wanted))
        .map(|option| option.to_string())
}

fn describe_interval(verb: &str, interval: u32) -> String {
    if interval == 1 {
        format!("Auto-save {} after every change to your Pokédex.\n", verb)
    } else {
        format!("Auto-save {} after every {} changes to your Pokédex.\n", verb, interval)
    }
}

/// Turn a 404 into a message naming what the user asked for.
fn not_found_as(kind: &str, name: &str, error: ApiError) -> anyhow::Error {
    if error.is_not_found() {
        anyhow::anyhow!("The {} '{}' was not found", kind, display_name(name))
    } else {
        anyhow::Error::new(error).context(format!("Could not fetch {} '{}'", kind, name))
    }
}

// ============================================================================
// Tests
// ============================================================================
