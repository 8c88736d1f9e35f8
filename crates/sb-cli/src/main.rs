//! SiteBlocker CLI
//!
//! Drives the blocker core against a state directory: `settings.json` stands
//! in for the browser's synced storage and `rules.json` for the dynamic rule
//! set.

mod state;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::debug;
use tokio::sync::broadcast;

use sb_core::badge::MemoryBadge;
use sb_core::messages::{Notification, Request};
use sb_core::store::StorageChange;
use sb_core::{
    find_blocking_site, navigation_host, BlockerConfig, BlocklistEditor, Dispatcher, Event,
    InstallReason, LocalClock, Navigation, RuleEngine, SettingsStore,
};

use state::{FileRuleEngine, FileStorage};

#[derive(Parser)]
#[command(name = "sb-cli")]
#[command(about = "SiteBlocker blocklist and rule tools")]
struct Cli {
    /// Directory holding settings.json and rules.json
    #[arg(long, global = true, default_value = ".siteblock")]
    state_dir: PathBuf,

    /// JSON config file (rule priority, redirect page, rule limit)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed default settings and install rules
    Install,

    /// Block a site (domain or pasted URL)
    Add { site: String },

    /// Unblock a site
    Remove { site: String },

    /// Add every site listed in a file, one per line
    Import {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the blocklist
    List,

    /// Turn blocking on
    Enable,

    /// Turn blocking off
    Disable,

    /// Flip the enabled flag
    Toggle,

    /// Empty the blocklist
    Clear,

    /// Report a navigation and count it if blocked
    Navigate {
        url: String,

        /// Report as a subframe load (never counted)
        #[arg(long)]
        subframe: bool,
    },

    /// Check whether a URL would be blocked, without counting
    Check { url: String },

    /// Rebuild installed rules from settings
    Sync,

    /// Print installed rules
    Rules {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show blocklist size, state and today's count
    Stats,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = load_config(cli.config.as_deref())?;
    let mut host = Host::open(&cli.state_dir, &config);

    match cli.command {
        Commands::Install => cmd_install(&mut host).await,
        Commands::Add { site } => cmd_add(&mut host, &site).await,
        Commands::Remove { site } => cmd_remove(&mut host, &site).await,
        Commands::Import { input } => cmd_import(&mut host, &input).await,
        Commands::List => cmd_list(&host).await,
        Commands::Enable => cmd_set_enabled(&mut host, true).await,
        Commands::Disable => cmd_set_enabled(&mut host, false).await,
        Commands::Toggle => cmd_toggle(&mut host).await,
        Commands::Clear => cmd_clear(&mut host).await,
        Commands::Navigate { url, subframe } => cmd_navigate(&mut host, &url, subframe).await,
        Commands::Check { url } => cmd_check(&host, &url).await,
        Commands::Sync => cmd_sync(&mut host).await,
        Commands::Rules { json } => cmd_rules(&host, json).await,
        Commands::Stats => cmd_stats(&host).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<BlockerConfig, String> {
    let config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
            BlockerConfig::from_json_str(&text).map_err(|e| e.to_string())?
        }
        None => BlockerConfig::default(),
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

// =============================================================================
// Host
// =============================================================================

/// The background and popup wired to file-backed state.
struct Host {
    dispatcher: Dispatcher,
    editor: BlocklistEditor,
    engine: Arc<FileRuleEngine>,
    badge: Arc<MemoryBadge>,
    changes: broadcast::Receiver<StorageChange>,
}

impl Host {
    fn open(state_dir: &Path, config: &BlockerConfig) -> Self {
        let store = SettingsStore::new(Arc::new(FileStorage::new(state_dir)), Arc::new(LocalClock));
        let engine = Arc::new(FileRuleEngine::new(state_dir, config.max_dynamic_rules));
        let badge = Arc::new(MemoryBadge::new());
        let changes = store.subscribe();
        debug!("Using state directory {}", state_dir.display());

        Self {
            dispatcher: Dispatcher::new(store.clone(), engine.clone(), badge.clone(), config),
            editor: BlocklistEditor::new(store),
            engine,
            badge,
            changes,
        }
    }

    /// Deliver storage changes made by this process to the dispatcher.
    async fn pump(&mut self) {
        loop {
            match self.changes.try_recv() {
                Ok(change) => {
                    self.dispatcher.dispatch(Event::from(change)).await;
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    debug!("Skipped {} storage changes, resyncing", skipped);
                    self.dispatcher.dispatch(Event::Startup).await;
                }
                Err(_) => break,
            }
        }
    }

    async fn rule_count(&self) -> Result<usize, String> {
        self.engine.dynamic_rules().await.map(|r| r.len()).map_err(|e| e.to_string())
    }

    async fn print_summary(&self) -> Result<(), String> {
        let rules = self.rule_count().await?;
        let badge = self.badge.text();
        println!(
            "  Rules: {}  Badge: {}",
            rules,
            if badge.is_empty() { "(none)" } else { badge.as_str() }
        );
        Ok(())
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn cmd_install(host: &mut Host) -> Result<(), String> {
    let response = host.dispatcher.dispatch(Event::Installed(InstallReason::Install)).await;
    debug!("Install response: {:?}", response);
    host.pump().await;
    println!("Initialized state");
    host.print_summary().await
}

async fn cmd_add(host: &mut Host, site: &str) -> Result<(), String> {
    let domain = host.editor.add_site(site).await.map_err(|e| e.to_string())?;
    host.pump().await;
    println!("Blocked {}", domain);
    host.print_summary().await
}

async fn cmd_remove(host: &mut Host, site: &str) -> Result<(), String> {
    let domain = host.editor.remove_site(site).await.map_err(|e| e.to_string())?;
    host.pump().await;
    println!("Unblocked {}", domain);
    host.print_summary().await
}

async fn cmd_import(host: &mut Host, input: &Path) -> Result<(), String> {
    let text = fs::read_to_string(input)
        .map_err(|e| format!("Failed to read '{}': {}", input.display(), e))?;
    let report = host.editor.import(&text).await.map_err(|e| e.to_string())?;
    host.pump().await;

    println!("Imported {}", input.display());
    println!("  Added:      {}", report.added.len());
    println!("  Duplicates: {}", report.duplicate.len());
    println!("  Invalid:    {}", report.invalid.len());
    for line in &report.invalid {
        println!("    {}", line);
    }
    host.print_summary().await
}

async fn cmd_list(host: &Host) -> Result<(), String> {
    let settings = host.dispatcher.store().read().await.map_err(|e| e.to_string())?;
    if settings.blocked_sites.is_empty() {
        println!("Blocklist is empty");
        return Ok(());
    }
    for site in &settings.blocked_sites {
        println!("{}", site);
    }
    Ok(())
}

async fn cmd_set_enabled(host: &mut Host, enabled: bool) -> Result<(), String> {
    host.editor.set_enabled(enabled).await.map_err(|e| e.to_string())?;
    host.pump().await;
    println!("Blocking {}", if enabled { "enabled" } else { "disabled" });
    host.print_summary().await
}

async fn cmd_toggle(host: &mut Host) -> Result<(), String> {
    let enabled = host.editor.toggle().await.map_err(|e| e.to_string())?;
    host.pump().await;
    println!("Blocking {}", if enabled { "enabled" } else { "disabled" });
    host.print_summary().await
}

async fn cmd_clear(host: &mut Host) -> Result<(), String> {
    let removed = host.editor.clear().await.map_err(|e| e.to_string())?;
    host.pump().await;
    println!("Removed {} sites", removed);
    host.print_summary().await
}

async fn cmd_navigate(host: &mut Host, url: &str, subframe: bool) -> Result<(), String> {
    let navigation = if subframe {
        Navigation::sub_frame(url)
    } else {
        Navigation::main_frame(url)
    };

    let event = host
        .dispatcher
        .monitor()
        .on_navigation(&navigation)
        .await
        .map_err(|e| e.to_string())?;
    host.pump().await;

    match event {
        Some(event) => {
            let notification = serde_json::to_string(&Notification::from(&event))
                .map_err(|e| format!("Failed to encode notification: {}", e))?;
            println!("Blocked {} (matched {})", event.domain, event.site);
            println!("  Today: {}", event.today_blocks);
            println!("  Notification: {}", notification);
        }
        None => println!("Allowed {}", url),
    }
    Ok(())
}

async fn cmd_check(host: &Host, url: &str) -> Result<(), String> {
    let settings = host.dispatcher.store().read().await.map_err(|e| e.to_string())?;
    let host_name = navigation_host(url).map_err(|e| e.to_string())?;

    match find_blocking_site(&settings.blocked_sites, &host_name) {
        Some(site) if settings.is_enabled => println!("{} is blocked by {}", host_name, site),
        Some(site) => println!("{} matches {} (blocking disabled)", host_name, site),
        None => println!("{} is not blocked", host_name),
    }
    Ok(())
}

async fn cmd_sync(host: &mut Host) -> Result<(), String> {
    let response = host
        .dispatcher
        .dispatch(Event::Message(Request::UpdateRules))
        .await
        .ok_or_else(|| "No response to rule update".to_string())?;
    if let Some(error) = response.error {
        return Err(error);
    }
    println!("Rules synchronized");
    host.print_summary().await
}

async fn cmd_rules(host: &Host, json: bool) -> Result<(), String> {
    let rules = host.engine.dynamic_rules().await.map_err(|e| e.to_string())?;

    if json {
        let text = serde_json::to_string_pretty(&rules)
            .map_err(|e| format!("Failed to encode rules: {}", e))?;
        println!("{}", text);
        return Ok(());
    }

    if rules.is_empty() {
        println!("No rules installed");
        return Ok(());
    }
    for rule in &rules {
        println!("{:>6}  p{}  {:?}  {}", rule.id, rule.priority, rule.action.kind, rule.condition.url_filter);
    }
    Ok(())
}

async fn cmd_stats(host: &Host) -> Result<(), String> {
    let stats = host.editor.stats().await.map_err(|e| e.to_string())?;
    let rules = host.rule_count().await?;

    println!("Blocker Stats");
    println!("=============");
    println!("  Sites:        {}", stats.sites);
    println!("  Enabled:      {}", stats.enabled);
    println!("  Blocked today: {}", stats.today_blocks);
    println!("  Rules:        {}", rules);
    Ok(())
}
