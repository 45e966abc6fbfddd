mod commands;
mod config;
mod remote;
mod server;

use anyhow::Result;
use chrono::Duration;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    RecipeFields, RemoteTarget, cmd_pantry_add, cmd_pantry_expiring, cmd_pantry_list,
    cmd_pantry_recommend, cmd_pantry_remove, cmd_plan_add, cmd_plan_remove,
    cmd_plan_shopping_list, cmd_plan_show, cmd_plan_week, cmd_recipe_add, cmd_recipe_favorite,
    cmd_recipe_list, cmd_recipe_remove, cmd_recipe_show, cmd_recipe_update, cmd_suggest, cmd_sync,
    open_store, parse_date,
};
use crate::config::Config;
use cookoo_core::db::Database;
use cookoo_core::filter::RecipeFilter;
use cookoo_core::models::{Difficulty, IngredientCategory, MealCategory, MealType};
use cookoo_core::pantry::Pantry;
use cookoo_core::planner::{MealPlanner, WEEK_DAYS};
use cookoo_core::store::RecipeStore;

#[derive(Parser)]
#[command(
    name = "cookoo",
    version,
    about = "Recipes, pantry and meal plans, synced across devices",
    long_about = "\n\n   ___ ___   ___  _  _____   ___
  / __/ _ \\ / _ \\| |/ / _ \\ / _ \\
 | (_| (_) | (_) | ' < (_) | (_) |
  \\___\\___/ \\___/|_|\\_\\___/ \\___/
        what's for dinner?
"
)]
struct Cli {
    /// Base URL of a `cookoo serve` document store to sync recipes with
    #[arg(long, global = true, env = "COOKOO_REMOTE_URL")]
    remote: Option<String>,
    /// Project on the document store
    #[arg(long, global = true, env = "COOKOO_PROJECT", default_value = "cookoo")]
    project: String,
    /// Log filter when RUST_LOG is unset (e.g. warn, info, `cookoo_core=debug`)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse and edit recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Suggest random recipes
    Suggest {
        /// Only suggest from this category
        #[arg(short, long)]
        category: Option<MealCategory>,
        /// How many to suggest
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Track ingredients on hand
    Pantry {
        #[command(subcommand)]
        command: PantryCommands,
    },
    /// Plan meals on the calendar
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Sync recipes with the remote and report status
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a document store other devices can sync recipes through
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// List recipes, optionally filtered
    List {
        /// Name contains (case-insensitive)
        #[arg(short, long)]
        query: Option<String>,
        /// Category: breakfast, lunch, dinner, snack
        #[arg(short, long)]
        category: Option<MealCategory>,
        /// Difficulty: easy, medium, hard
        #[arg(short, long)]
        difficulty: Option<Difficulty>,
        /// Has this tag
        #[arg(long)]
        tag: Option<String>,
        /// At most this many minutes
        #[arg(long)]
        max_time: Option<u32>,
        /// Favorites only
        #[arg(short, long)]
        favorites: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe
    Show {
        /// Recipe id or name
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a recipe
    Add {
        /// Recipe name
        name: String,
        #[command(flatten)]
        fields: RecipeFields,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update fields of a recipe. List flags replace the whole list
    Update {
        /// Recipe id or name
        recipe: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: RecipeFields,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a recipe
    Remove {
        /// Recipe id or name
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Toggle a recipe's favorite flag
    Favorite {
        /// Recipe id or name
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PantryCommands {
    /// List everything in the pantry
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add an ingredient
    Add {
        /// Ingredient name
        name: String,
        /// Category: vegetable, fruit, meat, seafood, dairy, seasoning, other
        #[arg(short, long)]
        category: Option<IngredientCategory>,
        /// Amount on hand (e.g. "500g", "6")
        #[arg(short, long)]
        quantity: Option<String>,
        /// Purchase date (YYYY-MM-DD or today/yesterday)
        #[arg(long)]
        purchased: Option<String>,
        /// Days it keeps after purchase
        #[arg(long)]
        shelf_life: Option<u32>,
        /// Expiry date (YYYY-MM-DD), overrides purchase date + shelf life
        #[arg(long)]
        expires: Option<String>,
        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an ingredient by id or name
    Remove {
        /// Ingredient id or name
        item: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ingredients expiring within three days, or already expired
    Expiring {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recipes that use what's on hand
    Recommend {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Show planned meals
    Show {
        /// First day (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Number of days to show
        #[arg(short, long, default_value = "1")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Plan a recipe for a meal
    Add {
        /// Recipe id or name
        recipe: String,
        /// Meal: breakfast, lunch, dinner
        #[arg(short, long)]
        meal: MealType,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a recipe from a day
    Remove {
        /// Recipe id or name
        recipe: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fill a week with breakfast, lunch and dinner
    Week {
        /// First day (default: today)
        #[arg(long)]
        start: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ingredients needed for planned meals
    ShoppingList {
        /// First day (default: today)
        #[arg(long)]
        from: Option<String>,
        /// Last day (default: a week after the first day)
        #[arg(long)]
        to: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn parse_optional_date(date: Option<String>) -> Result<Option<chrono::NaiveDate>> {
    date.map(|d| parse_date(Some(d))).transpose()
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::open(&config.db_path)?;
    let target = cli.remote.clone().map(|url| RemoteTarget {
        url,
        project: cli.project.clone(),
    });

    match cli.command {
        Commands::Serve { port, bind } => server::start_server(db, port, &bind).await,
        Commands::Pantry { command } => {
            let mut pantry = Pantry::load(db.clone());
            match command {
                PantryCommands::List { json } => cmd_pantry_list(&pantry, json),
                PantryCommands::Add {
                    name,
                    category,
                    quantity,
                    purchased,
                    shelf_life,
                    expires,
                    tags,
                    json,
                } => cmd_pantry_add(
                    &mut pantry,
                    &name,
                    category,
                    quantity,
                    parse_optional_date(purchased)?,
                    shelf_life,
                    parse_optional_date(expires)?,
                    tags,
                    json,
                ),
                PantryCommands::Remove { item, json } => cmd_pantry_remove(&mut pantry, &item, json),
                PantryCommands::Expiring { json } => cmd_pantry_expiring(&pantry, json),
                PantryCommands::Recommend { json } => {
                    let store = open_store(&db, target.as_ref()).await?;
                    let result = cmd_pantry_recommend(&pantry, &store, json);
                    store.close().await;
                    result
                }
            }
        }
        command => {
            let store = open_store(&db, target.as_ref()).await?;
            let result = run_with_store(command, &store, &db, target.as_ref()).await;
            store.close().await;
            result
        }
    }
}

async fn run_with_store(
    command: Commands,
    store: &RecipeStore,
    db: &Database,
    target: Option<&RemoteTarget>,
) -> Result<()> {
    match command {
        Commands::Recipe { command } => match command {
            RecipeCommands::List {
                query,
                category,
                difficulty,
                tag,
                max_time,
                favorites,
                json,
            } => {
                let filter = RecipeFilter {
                    query,
                    category,
                    difficulty,
                    tag,
                    max_minutes: max_time,
                    favorites_only: favorites,
                };
                cmd_recipe_list(store, &filter, json)
            }
            RecipeCommands::Show { recipe, json } => cmd_recipe_show(store, &recipe, json),
            RecipeCommands::Add { name, fields, json } => {
                cmd_recipe_add(store, &name, fields, json).await
            }
            RecipeCommands::Update {
                recipe,
                name,
                fields,
                json,
            } => cmd_recipe_update(store, &recipe, name, fields, json).await,
            RecipeCommands::Remove { recipe, json } => cmd_recipe_remove(store, &recipe, json).await,
            RecipeCommands::Favorite { recipe, json } => {
                cmd_recipe_favorite(store, &recipe, json).await
            }
        },
        Commands::Suggest {
            category,
            count,
            json,
        } => cmd_suggest(store, category, count, json),
        Commands::Plan { command } => {
            let mut planner = MealPlanner::load(db.clone());
            match command {
                PlanCommands::Show { date, days, json } => {
                    cmd_plan_show(&planner, store, parse_date(date)?, days, json)
                }
                PlanCommands::Add {
                    recipe,
                    meal,
                    date,
                    json,
                } => cmd_plan_add(&mut planner, store, parse_date(date)?, &recipe, meal, json),
                PlanCommands::Remove { recipe, date, json } => {
                    cmd_plan_remove(&mut planner, store, parse_date(date)?, &recipe, json)
                }
                PlanCommands::Week { start, json } => {
                    cmd_plan_week(&mut planner, store, parse_date(start)?, json)
                }
                PlanCommands::ShoppingList { from, to, json } => {
                    let from = parse_date(from)?;
                    let to = match to {
                        Some(to) => parse_date(Some(to))?,
                        None => from + Duration::days(WEEK_DAYS - 1),
                    };
                    cmd_plan_shopping_list(&planner, store, from, to, json)
                }
            }
        }
        Commands::Sync { json } => cmd_sync(store, target.map(|t| t.url.as_str()), json).await,
        // Dispatched in `run`.
        Commands::Serve { .. } | Commands::Pantry { .. } => Ok(()),
    }
}
