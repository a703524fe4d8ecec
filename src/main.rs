use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use coursebot::batch::BatchReport;
use coursebot::config::{CourseConfig, Settings, SettingsOverrides, COURSE_CONFIG_PATH};
use coursebot::final_grade::{distribution, export_rows, Gradebook};
use coursebot::github::auth::Authenticator;
use coursebot::github::client::GitHubClient;
use coursebot::github::Forge;
use coursebot::grading::{Aggregation, GradeError, GradingFailed, Subject};
use coursebot::output::csv::{
    aggregation_to_csv, batch_to_csv, distribution_to_csv, export_to_csv, groups_to_csv,
    students_to_csv,
};
use coursebot::output::json::render_json;
use coursebot::output::table::{
    render_aggregation_table, render_batch_table, render_database_table,
    render_distribution_table, render_export_table, render_grade_errors_table,
    render_groups_table, render_insights_table, render_students_table,
};
use coursebot::server::{run_server, AppState};
use coursebot::workflows::insights::Insights;
use coursebot::workflows::{
    final_grades, grading, groups, insights, provisioning, students, submissions, Course,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Report {
    Students,
    Groups,
    Distribution,
    Export,
}

#[derive(Debug, Parser)]
#[command(
    name = "coursebot",
    about = "Course administration on top of a GitHub organization"
)]
struct Cli {
    /// Course slug; overrides COURSE.
    #[arg(long)]
    course: Option<String>,
    /// Organization login; overrides GITHUB_ORG.
    #[arg(long)]
    org: Option<String>,
    /// Local course configuration instead of the staff repository copy.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the staff and students teams, the staff repository and its
    /// database issues.
    Initialize,
    Students {
        #[command(subcommand)]
        command: StudentCommands,
    },
    Groups {
        #[command(subcommand)]
        command: GroupCommands,
    },
    Assignments {
        #[command(subcommand)]
        command: AssignmentCommands,
    },
    Iterations {
        #[command(subcommand)]
        command: IterationCommands,
    },
    /// Summarize feedback responses for an assignment.
    Insights { assignment: String },
    Grading {
        #[command(subcommand)]
        command: GradingCommands,
    },
    FinalGrades {
        #[arg(long, value_enum, default_value_t = Report::Students)]
        report: Report,
    },
    /// Serve the onboarding, submission and feedback forms.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[derive(Debug, Subcommand)]
enum StudentCommands {
    Onboard { github: String, hopkins: String },
    Delete { github: String },
    /// Report students whose repository lacks the assignment directory.
    Check { assignment: String },
}

#[derive(Debug, Subcommand)]
enum GroupCommands {
    Create {
        identifier: String,
        #[arg(required = true, num_args = 1..)]
        members: Vec<String>,
    },
    Delete { identifier: String },
}

#[derive(Debug, Subcommand)]
enum AssignmentCommands {
    /// Copy the assignment template into every student repository.
    Template { assignment: String },
    Submit {
        assignment: String,
        github: String,
        commit: String,
        /// Submission time (RFC 3339); defaults to now.
        #[arg(long)]
        time: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Subcommand)]
enum IterationCommands {
    Submit {
        iteration: String,
        group: String,
        commit: String,
        #[arg(long)]
        time: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Subcommand)]
enum GradingCommands {
    /// Create empty part files, one section per gradable entity.
    Start {
        subject: Subject,
        #[arg(required = true, num_args = 1..)]
        parts: Vec<String>,
    },
    /// Parse and aggregate part files without publishing.
    Check { subject: Subject },
    Publish { subject: Subject },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    if let Commands::Config { .. } = &cli.command {
        return handle_config_command(&cli).await;
    }

    let settings = load_settings(&cli)?;
    let forge: Arc<dyn Forge> = Arc::new(build_forge(&settings));

    if let Commands::Initialize = &cli.command {
        let database = provisioning::initialize(forge.as_ref(), &settings).await?;
        match cli.output {
            OutputFormat::Table => {
                println!("{}", render_database_table(&database));
                println!("Add this to the `database` section of {COURSE_CONFIG_PATH}:");
                println!("{}", render_json(&database)?);
            }
            OutputFormat::Json | OutputFormat::Csv => println!("{}", render_json(&database)?),
        }
        return Ok(());
    }

    let course = Course::load(forge.as_ref(), &settings).await?;
    match cli.command {
        Commands::Initialize | Commands::Config { .. } => {}
        Commands::Students { command } => match command {
            StudentCommands::Onboard { github, hopkins } => {
                let record = students::onboard(&course, &github, &hopkins).await?;
                info!("onboarded {} ({})", record.github, record.hopkins);
                if let OutputFormat::Json = cli.output {
                    println!("{}", render_json(&record)?);
                }
            }
            StudentCommands::Delete { github } => {
                let removal = students::delete(&course, &github).await;
                print_batch(&removal.report, cli.output)?;
                for step in &removal.follow_ups {
                    println!("Follow up: {step}");
                }
            }
            StudentCommands::Check { assignment } => {
                let report = students::check(&course, &assignment).await?;
                print_batch(&report, cli.output)?;
            }
        },
        Commands::Groups { command } => match command {
            GroupCommands::Create {
                identifier,
                members,
            } => {
                let record = groups::create(&course, &identifier, &members).await?;
                info!(
                    "created group {} with {} member(s)",
                    record.identifier,
                    record.members.len()
                );
                if let OutputFormat::Json = cli.output {
                    println!("{}", render_json(&record)?);
                }
            }
            GroupCommands::Delete { identifier } => {
                let report = groups::delete(&course, &identifier).await;
                print_batch(&report, cli.output)?;
            }
        },
        Commands::Assignments { command } => match command {
            AssignmentCommands::Template { assignment } => {
                let report = submissions::distribute_template(&course, &assignment).await?;
                print_batch(&report, cli.output)?;
            }
            AssignmentCommands::Submit {
                assignment,
                github,
                commit,
                time,
            } => {
                let record =
                    submissions::submit_assignment(&course, &assignment, &github, &commit, time)
                        .await?;
                if let OutputFormat::Json = cli.output {
                    println!("{}", render_json(&record)?);
                }
            }
        },
        Commands::Iterations { command } => match command {
            IterationCommands::Submit {
                iteration,
                group,
                commit,
                time,
            } => {
                let record =
                    submissions::submit_iteration(&course, &iteration, &group, &commit, time)
                        .await?;
                if let OutputFormat::Json = cli.output {
                    println!("{}", render_json(&record)?);
                }
            }
        },
        Commands::Insights { assignment } => {
            let summary = insights::insights(&course, &assignment).await?;
            print_insights(&summary, cli.output)?;
        }
        Commands::Grading { command } => match command {
            GradingCommands::Start { subject, parts } => {
                let report = grading::start(&course, &subject, &parts).await?;
                print_batch(&report, cli.output)?;
            }
            GradingCommands::Check { subject } => {
                let aggregation = grading::check(&course, &subject).await?;
                if !aggregation.is_clean() {
                    print_grade_errors(&aggregation.errors, cli.output)?;
                    return Err(GradingFailed {
                        subject: subject.to_string(),
                        errors: aggregation.errors,
                    }
                    .into());
                }
                print_aggregation(&aggregation, cli.output)?;
            }
            GradingCommands::Publish { subject } => {
                match grading::publish(&course, &subject).await {
                    Ok(report) => print_batch(&report, cli.output)?,
                    Err(err) => {
                        if let Some(failed) = err.downcast_ref::<GradingFailed>() {
                            print_grade_errors(&failed.errors, cli.output)?;
                        }
                        return Err(err);
                    }
                }
            }
        },
        Commands::FinalGrades { report } => {
            let book = final_grades::final_grades(&course).await?;
            print_final_grades(&book, &course.config, report, cli.output)?;
        }
        Commands::Serve { host, port } => {
            let bind = format!("{host}:{port}");
            let addr: SocketAddr = bind
                .parse()
                .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
            let state = AppState::new(forge.clone(), settings.clone(), course.config.clone());
            run_server(state, addr).await?;
        }
    }
    Ok(())
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::from_env()?;
    settings.apply_overrides(SettingsOverrides {
        course: cli.course.clone(),
        org: cli.org.clone(),
        course_config: cli.config.clone(),
    });
    Ok(settings)
}

fn build_forge(settings: &Settings) -> GitHubClient {
    GitHubClient::new(
        settings.api_url.clone(),
        settings.org.clone(),
        Authenticator::new(settings.credentials.clone()),
    )
}

/// `--init` needs no credentials; `--show` prints the configuration the
/// other commands would use.
async fn handle_config_command(cli: &Cli) -> Result<()> {
    let Commands::Config { init, show } = &cli.command else {
        return Ok(());
    };
    if *init {
        let path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(COURSE_CONFIG_PATH));
        CourseConfig::write_template(&path)?;
        println!("Wrote config template to {}", path.display());
    }
    if *show || !*init {
        let config = match &cli.config {
            Some(path) => CourseConfig::load(path)?,
            None => {
                let settings = load_settings(cli)?;
                let forge = build_forge(&settings);
                settings.course_config(&forge).await?
            }
        };
        println!("{}", render_json(&config)?);
    }
    Ok(())
}

fn print_batch(report: &BatchReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_batch_table(report)),
        OutputFormat::Json => println!("{}", render_json(report)?),
        OutputFormat::Csv => println!("{}", batch_to_csv(report)?),
    }
    if !report.is_success() {
        warn!("{}", report.summary());
    }
    Ok(())
}

fn print_grade_errors(errors: &[GradeError], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_grade_errors_table(errors)),
        OutputFormat::Json => println!("{}", render_json(errors)?),
        OutputFormat::Csv => {
            warn!("CSV output for grading errors not implemented, using JSON");
            println!("{}", render_json(errors)?);
        }
    }
    Ok(())
}

fn print_aggregation(aggregation: &Aggregation, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_aggregation_table(aggregation)),
        OutputFormat::Json => println!("{}", render_json(aggregation)?),
        OutputFormat::Csv => println!("{}", aggregation_to_csv(aggregation)?),
    }
    Ok(())
}

fn print_insights(summary: &Insights, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_insights_table(summary)),
        OutputFormat::Json => println!("{}", render_json(summary)?),
        OutputFormat::Csv => {
            warn!("CSV output for insights not implemented, using JSON");
            println!("{}", render_json(summary)?);
        }
    }
    Ok(())
}

fn print_final_grades(
    book: &Gradebook,
    config: &CourseConfig,
    report: Report,
    format: OutputFormat,
) -> Result<()> {
    match report {
        Report::Students => match format {
            OutputFormat::Table => println!("{}", render_students_table(book)),
            OutputFormat::Json => println!("{}", render_json(&book.students)?),
            OutputFormat::Csv => println!("{}", students_to_csv(book)?),
        },
        Report::Groups => match format {
            OutputFormat::Table => println!("{}", render_groups_table(book)),
            OutputFormat::Json => println!("{}", render_json(&book.groups)?),
            OutputFormat::Csv => println!("{}", groups_to_csv(book)?),
        },
        Report::Distribution => {
            let rows = distribution(&book.students, &config.grading.cutoffs);
            match format {
                OutputFormat::Table => println!("{}", render_distribution_table(&rows)),
                OutputFormat::Json => println!("{}", render_json(&rows)?),
                OutputFormat::Csv => println!("{}", distribution_to_csv(&rows)?),
            }
        }
        Report::Export => {
            let rows = export_rows(&book.students);
            match format {
                OutputFormat::Table => println!("{}", render_export_table(&rows)),
                OutputFormat::Json => println!("{}", render_json(&rows)?),
                OutputFormat::Csv => println!("{}", export_to_csv(&rows)?),
            }
        }
    }
    Ok(())
}
