//! CLI binary for managing a local shop directory.

use std::io::{self, Write as _};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, mpsc};

use bookwithme_rs::geocoder;
use bookwithme_rs::models::{MapMarker, ShopId, ShopRecord};
use bookwithme_rs::registration::ShopRegistration;
use bookwithme_rs::search::ShopFilter;
use bookwithme_rs::storage::{FileStorage, KeyValueStorage};
use bookwithme_rs::store::ShopStore;
use clap::{Args, Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

/// Environment variable overriding the storage directory.
const DATA_DIR_ENV: &str = "BOOKWITHME_DATA_DIR";

/// Log filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

/// Local shop directory: register shops, search them, and place them on a map.
#[derive(Debug, Parser)]
#[command(name = "bookwithme", version, about)]
struct Cli {
    /// Override the storage directory (default: $BOOKWITHME_DATA_DIR, then XDG data dir).
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Register a new shop.
    Add(AddArgs),
    /// List shops, optionally filtered by free text or city.
    List {
        /// Case-insensitive text matched against name, city, and offers.
        #[arg(long)]
        query: Option<String>,
        /// Only shops in this city.
        #[arg(long)]
        city: Option<String>,
    },
    /// Show one shop with its offers.
    Show {
        /// Shop id.
        id: String,
    },
    /// Delete a shop.
    Remove {
        /// Shop id.
        id: String,
    },
    /// Ask a running `watch` to delete a shop.
    RequestDelete {
        /// Shop id.
        id: String,
    },
    /// Print the coordinate the geocoder assigns to a city.
    Geocode {
        /// City name.
        city: String,
        /// Salt spreading shops in the same city (usually the shop name).
        #[arg(long, default_value = "")]
        salt: String,
    },
    /// List map markers for shops with usable coordinates.
    Markers,
    /// Store a demo shop if the directory is empty.
    Seed,
    /// Follow changes made by other processes and carry out delete requests.
    Watch {
        /// Poll interval in milliseconds.
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
        /// Stop after this many polls (default: run until interrupted).
        #[arg(long)]
        max_polls: Option<u64>,
    },
}

/// Arguments for the `add` subcommand.
#[derive(Debug, Args)]
struct AddArgs {
    /// Business name.
    #[arg(long)]
    name: String,
    /// City.
    #[arg(long)]
    city: String,
    /// Contact e-mail.
    #[arg(long)]
    email: String,
    /// Street address.
    #[arg(long)]
    address: Option<String>,
    /// Offer as NAME=PRICE, may be repeated.
    #[arg(long = "offer", value_name = "NAME=PRICE", value_parser = parse_offer)]
    offers: Vec<(String, String)>,
}

impl AddArgs {
    /// Converts the arguments into a registration form.
    fn into_registration(self) -> ShopRegistration {
        let form = ShopRegistration::new(self.name, self.city, self.email);
        let form = match self.address {
            Some(address) => form.address(address),
            None => form,
        };
        self.offers
            .into_iter()
            .fold(form, |acc, (name, price)| acc.offer(name, price))
    }
}

/// Parses an offer in `NAME=PRICE` form for clap.
fn parse_offer(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, price)) if !name.trim().is_empty() => {
            Ok((name.trim().to_owned(), price.trim().to_owned()))
        }
        Some(_) => Err("offer name must not be empty".to_owned()),
        None => Err(format!("expected NAME=PRICE, got `{s}`")),
    }
}

/// Picks the storage directory: explicit flag, then environment.
fn resolve_data_dir(flag: Option<PathBuf>) -> Option<PathBuf> {
    flag.or_else(|| {
        std::env::var_os(DATA_DIR_ENV)
            .filter(|val| !val.is_empty())
            .map(PathBuf::from)
    })
}

/// Creates the storage backend, using `data_dir` if provided or the
/// default XDG data directory otherwise.
fn create_storage(data_dir: Option<PathBuf>) -> bookwithme_rs::error::Result<FileStorage> {
    let dir = match data_dir {
        Some(dir) => dir,
        None => FileStorage::default_dir()?,
    };
    FileStorage::new(dir)
}

/// Writes a colored error line to stderr.
fn report_error(message: &str) -> io::Result<ExitCode> {
    writeln!(io::stderr().lock(), "{} {message}", "error:".red().bold())?;
    Ok(ExitCode::FAILURE)
}

/// Runs the CLI, returning an appropriate exit code.
fn run() -> io::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(io::stderr)
        .init();

    let _dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    let storage = match create_storage(resolve_data_dir(cli.data_dir)) {
        Ok(storage) => storage,
        Err(err) => return report_error(&format!("failed to initialize storage: {err}")),
    };

    let store = match ShopStore::builder().storage(storage).build() {
        Ok(store) => Arc::new(store),
        Err(err) => return report_error(&format!("failed to open shop store: {err}")),
    };

    dispatch(&store, cli.command)
}

/// Dispatches to the appropriate subcommand handler.
fn dispatch(store: &Arc<ShopStore<FileStorage>>, command: Command) -> io::Result<ExitCode> {
    match command {
        Command::Add(args) => cmd_add(store, args),
        Command::List { query, city } => cmd_list(store, query, city),
        Command::Show { id } => cmd_show(store, &ShopId::new(id)),
        Command::Remove { id } => cmd_remove(store, &ShopId::new(id)),
        Command::RequestDelete { id } => cmd_request_delete(store, &ShopId::new(id)),
        Command::Geocode { city, salt } => cmd_geocode(&city, &salt),
        Command::Markers => print_markers_table(&store.markers()).map(|()| ExitCode::SUCCESS),
        Command::Seed => cmd_seed(store),
        Command::Watch {
            interval_ms,
            max_polls,
        } => cmd_watch(store, interval_ms, max_polls),
    }
}

/// Executes the `add` subcommand.
fn cmd_add<S: KeyValueStorage>(store: &ShopStore<S>, args: AddArgs) -> io::Result<ExitCode> {
    match store.register(args.into_registration()) {
        Ok(shop) => {
            writeln!(
                io::stdout().lock(),
                "{} {} {}",
                "Registered".green().bold(),
                shop.name.bold(),
                format_args!("({})", shop.id).dimmed()
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if err.is_storage_failure() => {
            report_error(&format!("could not save the shop, nothing was stored: {err}"))
        }
        Err(err) => report_error(&err.to_string()),
    }
}

/// Executes the `list` subcommand.
fn cmd_list<S: KeyValueStorage>(
    store: &ShopStore<S>,
    query: Option<String>,
    city: Option<String>,
) -> io::Result<ExitCode> {
    let filter = ShopFilter { query, city };
    print_shops_table(&store.search(&filter))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `show` subcommand.
fn cmd_show<S: KeyValueStorage>(store: &ShopStore<S>, id: &ShopId) -> io::Result<ExitCode> {
    match store.find_by_id(id) {
        Some(shop) => {
            print_shop_details(&shop)?;
            Ok(ExitCode::SUCCESS)
        }
        None => report_error(&format!("shop not found: {id}")),
    }
}

/// Executes the `remove` subcommand.
fn cmd_remove<S: KeyValueStorage>(store: &ShopStore<S>, id: &ShopId) -> io::Result<ExitCode> {
    match store.remove(id) {
        Ok(true) => {
            writeln!(io::stdout().lock(), "{} {id}", "Removed".green().bold())?;
            Ok(ExitCode::SUCCESS)
        }
        Ok(false) => {
            writeln!(
                io::stdout().lock(),
                "{}",
                format_args!("No shop with id {id}, nothing to do.").dimmed()
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report_error(&format!("failed to remove shop: {err}")),
    }
}

/// Executes the `request-delete` subcommand.
fn cmd_request_delete<S: KeyValueStorage>(
    store: &ShopStore<S>,
    id: &ShopId,
) -> io::Result<ExitCode> {
    match store.request_delete(id) {
        Ok(()) => {
            writeln!(
                io::stdout().lock(),
                "{} {id}",
                "Delete requested for".green().bold()
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report_error(&format!("failed to request delete: {err}")),
    }
}

/// Executes the `geocode` subcommand.
fn cmd_geocode(city: &str, salt: &str) -> io::Result<ExitCode> {
    let point = geocoder::geocode(city, salt);
    let known = geocoder::base_coordinate(&geocoder::normalize(city)) != geocoder::NATIONAL_CENTER;
    let mut out = io::stdout().lock();
    writeln!(out, "{} {point}", "Coordinate:".bold())?;
    if !known {
        writeln!(
            out,
            "{}",
            "City not in table, placed near the national center.".dimmed()
        )?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes the `seed` subcommand.
fn cmd_seed<S: KeyValueStorage>(store: &ShopStore<S>) -> io::Result<ExitCode> {
    match store.seed_if_empty() {
        Ok(Some(shop)) => {
            writeln!(
                io::stdout().lock(),
                "{} {} {}",
                "Seeded".green().bold(),
                shop.name.bold(),
                format_args!("({})", shop.id).dimmed()
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Ok(None) => {
            writeln!(
                io::stdout().lock(),
                "{}",
                "Directory is not empty, nothing seeded.".dimmed()
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report_error(&format!("failed to seed: {err}")),
    }
}

/// Executes the `watch` subcommand: polls the storage directory, carries
/// out delete requests, and prints the shop count after every refresh.
fn cmd_watch(
    store: &Arc<ShopStore<FileStorage>>,
    interval_ms: u64,
    max_polls: Option<u64>,
) -> io::Result<ExitCode> {
    let (sender, receiver) = mpsc::channel::<usize>();
    let subscription = match store.watch(move |shops| {
        // A closed receiver means the loop below has ended.
        let _sent = sender.send(shops.len());
    }) {
        Ok(id) => id,
        Err(err) => return report_error(&format!("failed to watch storage: {err}")),
    };

    let spinner = make_spinner(&format!(
        "Watching {} ({} shops)",
        store.storage().dir().display(),
        store.load().len()
    ));
    let interval = core::time::Duration::from_millis(interval_ms);
    let mut polls = 0_u64;
    let mut exit = ExitCode::SUCCESS;

    while max_polls.is_none_or(|max| polls < max) {
        polls += 1;
        if let Err(err) = store.storage().poll() {
            spinner.finish_and_clear();
            exit = report_error(&format!("failed to poll storage: {err}"))?;
            break;
        }
        for count in receiver.try_iter() {
            spinner.suspend(|| {
                writeln!(
                    io::stdout().lock(),
                    "{} {}",
                    "Refreshed:".cyan().bold(),
                    format_args!("{count} shops")
                )
            })?;
        }
        std::thread::sleep(interval);
    }

    spinner.finish_and_clear();
    if let Err(err) = store.unsubscribe(subscription) {
        tracing::warn!(error = %err, "failed to unsubscribe watcher");
    }
    Ok(exit)
}

// ── Output formatting ────────────────────────────────────────────────

/// Prints shops in a table.
fn print_shops_table(shops: &[ShopRecord]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    if shops.is_empty() {
        writeln!(out, "{}", "No shops found.".dimmed())?;
        return Ok(());
    }

    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Id").fg(Color::Cyan),
        Cell::new("Name").fg(Color::Cyan),
        Cell::new("City").fg(Color::Cyan),
        Cell::new("Offers").fg(Color::Cyan),
        Cell::new("Coordinate").fg(Color::Cyan),
    ]);

    for shop in shops {
        let coordinate_cell = shop
            .coordinate()
            .map_or_else(|| Cell::new("\u{2014}").fg(Color::DarkGrey), Cell::new);
        _ = table.add_row(vec![
            Cell::new(&shop.id),
            Cell::new(&shop.name),
            Cell::new(&shop.city),
            Cell::new(shop.offers.len()),
            coordinate_cell,
        ]);
    }

    writeln!(
        out,
        "{} {}",
        "Shops".green().bold(),
        format_args!("({})", shops.len()).dimmed()
    )?;
    writeln!(out)?;
    writeln!(out, "{table}")?;
    Ok(())
}

/// Prints one shop with its offers.
fn print_shop_details(shop: &ShopRecord) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "{} {}", shop.name.green().bold(), format_args!("({})", shop.id).dimmed())?;
    writeln!(out)?;
    writeln!(out, "  {} {}", "City:".bold(), shop.city)?;
    writeln!(out, "  {} {}", "E-mail:".bold(), shop.email)?;
    if let Some(address) = shop.address.as_ref() {
        writeln!(out, "  {} {address}", "Address:".bold())?;
    }
    match shop.coordinate() {
        Some(point) => writeln!(out, "  {} {point}", "Coordinate:".bold())?,
        None => writeln!(out, "  {} {}", "Coordinate:".bold(), "\u{2014}".dimmed())?,
    }
    if shop.offers.is_empty() {
        return Ok(());
    }

    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Offer").fg(Color::Cyan),
        Cell::new("Price").fg(Color::Cyan),
    ]);
    for offer in &shop.offers {
        _ = table.add_row(vec![Cell::new(&offer.name), Cell::new(&offer.price)]);
    }
    writeln!(out)?;
    writeln!(out, "{table}")?;
    Ok(())
}

/// Prints map markers in a table.
fn print_markers_table(markers: &[MapMarker]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    if markers.is_empty() {
        writeln!(out, "{}", "No markers to show.".dimmed())?;
        return Ok(());
    }

    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Name").fg(Color::Cyan),
        Cell::new("City").fg(Color::Cyan),
        Cell::new("Lat").fg(Color::Cyan),
        Cell::new("Lng").fg(Color::Cyan),
    ]);
    for marker in markers {
        _ = table.add_row(vec![
            Cell::new(&marker.name),
            Cell::new(&marker.city),
            Cell::new(format!("{:.5}", marker.coordinate.lat)),
            Cell::new(format!("{:.5}", marker.coordinate.lng)),
        ]);
    }

    writeln!(
        out,
        "{} {}",
        "Markers".green().bold(),
        format_args!("({})", markers.len()).dimmed()
    )?;
    writeln!(out)?;
    writeln!(out, "{table}")?;
    Ok(())
}

/// Creates a spinner with the given message.
fn make_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_owned());
    spinner.enable_steady_tick(core::time::Duration::from_millis(80));
    spinner
}

/// Entry point.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            // stderr itself may be gone.
            let _ignored = writeln!(io::stderr(), "fatal I/O error: {err}");
            ExitCode::FAILURE
        }
    }
}
