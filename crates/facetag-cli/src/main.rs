use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use facetag_core::{
    BatchReport, EmbeddingRepository, EnrollmentCoordinator, EuclideanMatcher, Identifier,
    ImageSource, PersonId, PhotoId, PhotoProcessor, Sample,
};
use facetag_store::Store;

mod config;
mod detector;

use config::Config;
use detector::{read_embedding, SidecarDetector};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "bmp"];

#[derive(Parser)]
#[command(name = "facetag", about = "Match photos to enrolled people by face")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database
    Init,
    /// Register a person
    AddPerson {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
    },
    /// List registered people
    People,
    /// Enroll reference samples for a person (images with sidecars, or *.json embeddings)
    Enroll {
        person_id: i64,
        #[arg(required = true)]
        samples: Vec<PathBuf>,
    },
    /// Upload photos for processing
    AddPhoto {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Event to group the photos under
        #[arg(short, long)]
        event: Option<String>,
        /// Person id of the uploader
        #[arg(short, long)]
        uploader: Option<i64>,
    },
    /// Process pending photos once
    Process {
        /// Process only this photo
        #[arg(long)]
        photo: Option<i64>,
    },
    /// Process pending photos on an interval until interrupted
    Watch {
        /// Seconds between passes (defaults to the configured interval)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Identify a single embedding (*.json array) against all enrolled people
    Identify { embedding: PathBuf },
    /// List photos a person appears in
    Photos { person_id: i64 },
    /// Show counts of people and photos
    Stats,
    /// Put a failed photo back in the pending queue
    Reset { photo_id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Init => {
            open_store(&config)?;
            println!("Database ready at {}", config.db_path.display());
        }
        Commands::AddPerson { name, email } => {
            let store = open_store(&config)?;
            let id = store.add_person(&name, &email)?;
            println!("Registered {name} as person {id}");
        }
        Commands::People => {
            let store = open_store(&config)?;
            let people = store.people()?;
            if people.is_empty() {
                println!("No people registered");
            }
            for p in people {
                println!("{}\t{}\t{}\t{} samples", p.id, p.name, p.email, p.embedding_count);
            }
        }
        Commands::Enroll { person_id, samples } => enroll(&config, PersonId(person_id), &samples)?,
        Commands::AddPhoto { paths, event, uploader } => {
            add_photos(&config, &paths, event.as_deref(), uploader.map(PersonId))?;
        }
        Commands::Process { photo: Some(id) } => {
            let mut store = open_store(&config)?;
            let population = store.population()?;
            let outcome = processor(&config).process(&mut store, PhotoId(id), &population)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Process { photo: None } => {
            let report = run_pass(&config)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Watch { interval } => {
            let secs = interval.unwrap_or(config.watch_interval_secs);
            watch(config, secs).await?;
        }
        Commands::Identify { embedding } => {
            let store = open_store(&config)?;
            let probe = read_embedding(&embedding)
                .with_context(|| format!("reading {}", embedding.display()))?;
            probe.check_dim(config.embedding_dim)?;
            let identifier = Identifier::new(EuclideanMatcher::new(config.tolerance));
            let result = identifier.identify(&probe, &store.population()?);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Photos { person_id } => {
            let store = open_store(&config)?;
            let photos = store.photos_of(PersonId(person_id))?;
            println!("{} photos", photos.len());
            for t in photos {
                println!(
                    "{}\t{:.3}\t{}\t{}",
                    t.photo.id,
                    t.confidence,
                    t.event_name.as_deref().unwrap_or("-"),
                    t.photo.file_path.display()
                );
            }
        }
        Commands::Stats => {
            let store = open_store(&config)?;
            println!("{}", serde_json::to_string_pretty(&store.stats()?)?);
        }
        Commands::Reset { photo_id } => {
            let store = open_store(&config)?;
            store.reset(PhotoId(photo_id))?;
            println!("Photo {photo_id} is pending again");
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<Store> {
    let store = Store::open(&config.db_path, config.embedding_dim)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    store.initialize()?;
    Ok(store)
}

fn processor(config: &Config) -> PhotoProcessor<SidecarDetector> {
    PhotoProcessor::new(
        SidecarDetector,
        Identifier::new(EuclideanMatcher::new(config.tolerance)),
        config.embedding_dim,
    )
}

/// One processing pass over every pending photo.
fn run_pass(config: &Config) -> Result<BatchReport> {
    let mut store = open_store(config)?;
    let population = store.population()?;
    Ok(processor(config).process_pending(&mut store, &population)?)
}

async fn watch(config: Config, interval_secs: u64) -> Result<()> {
    tracing::info!(interval_secs, "watching for pending photos");
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let pass_config = config.clone();
                match tokio::task::spawn_blocking(move || run_pass(&pass_config)).await? {
                    Ok(report) if report.processed + report.failed > 0 => {
                        println!("processed {}, failed {}", report.processed, report.failed);
                    }
                    Ok(_) => {}
                    Err(err) => tracing::error!(error = %err, "processing pass failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("watch stopping");
                break;
            }
        }
    }

    Ok(())
}

fn enroll(config: &Config, person: PersonId, paths: &[PathBuf]) -> Result<()> {
    let mut store = open_store(config)?;

    let mut samples = Vec::with_capacity(paths.len());
    for path in paths {
        if has_extension(path, &["json"]) {
            let embedding = read_embedding(path)
                .with_context(|| format!("reading {}", path.display()))?;
            samples.push(Sample::Embedding(embedding));
        } else {
            samples.push(Sample::Image(ImageSource::Path(path.clone())));
        }
    }

    let coordinator = EnrollmentCoordinator::new(SidecarDetector, config.embedding_dim)
        .with_min_samples(config.min_enroll_samples);
    let report = coordinator.enroll(&mut store, person, samples)?;

    println!(
        "Enrolled {} samples for person {person} ({} dropped)",
        report.enrolled_count, report.dropped
    );
    Ok(())
}

/// Upload each image in `paths`. Unreadable files are skipped; the count of
/// newly stored photos is returned.
fn add_photos(
    config: &Config,
    paths: &[PathBuf],
    event: Option<&str>,
    uploader: Option<PersonId>,
) -> Result<usize> {
    let store = open_store(config)?;
    let mut added = 0;

    for path in paths {
        if !has_extension(path, &IMAGE_EXTENSIONS) {
            tracing::warn!(path = %path.display(), "not an image, skipped");
            continue;
        }
        let (absolute, content) = match std::fs::canonicalize(path)
            .and_then(|absolute| std::fs::read(&absolute).map(|content| (absolute, content)))
        {
            Ok(read) => read,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "unreadable, skipped");
                continue;
            }
        };
        let (id, created) = store.add_photo(&absolute, &content, event, uploader)?;
        if created {
            added += 1;
            println!("{id}\t{}", absolute.display());
        } else {
            println!("{id}\t{} (already uploaded)", absolute.display());
        }
    }
    Ok(added)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| allowed.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetag_core::Embedding;

    #[test]
    fn test_image_extensions() {
        assert!(has_extension(Path::new("a/b.JPG"), &IMAGE_EXTENSIONS));
        assert!(has_extension(Path::new("b.jpeg"), &IMAGE_EXTENSIONS));
        assert!(!has_extension(Path::new("b.txt"), &IMAGE_EXTENSIONS));
        assert!(!has_extension(Path::new("README"), &IMAGE_EXTENSIONS));
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["facetag", "enroll", "7", "a.jpg", "b.json"]).unwrap();
        match cli.command {
            Commands::Enroll { person_id, samples } => {
                assert_eq!(person_id, 7);
                assert_eq!(samples.len(), 2);
            }
            _ => panic!("wrong subcommand"),
        }
        assert!(Cli::try_parse_from(["facetag", "enroll", "7"]).is_err());
    }

    #[test]
    fn test_add_photos_skips_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_path: dir.path().join("facetag.db"),
            ..Config::default()
        };
        let first = dir.path().join("first.jpg");
        let last = dir.path().join("last.png");
        std::fs::write(&first, b"one").unwrap();
        std::fs::write(&last, b"two").unwrap();
        let paths = vec![first, dir.path().join("missing.jpg"), last];

        assert_eq!(add_photos(&config, &paths, Some("party"), None).unwrap(), 2);
        assert_eq!(open_store(&config).unwrap().stats().unwrap().pending, 2);
    }

    #[test]
    fn test_run_pass_against_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_path: dir.path().join("db/facetag.db"),
            embedding_dim: 2,
            ..Config::default()
        };

        let image = dir.path().join("party.jpg");
        std::fs::write(&image, b"fake jpeg").unwrap();
        std::fs::write(
            detector::sidecar_path(&image),
            r#"[{"embedding": [0.1, 0.0]}, {"embedding": [5.0, 5.0]}]"#,
        )
        .unwrap();

        let mut store = open_store(&config).unwrap();
        let ada = store.add_person("Ada", "ada@example.com").unwrap();
        store.add(ada, Embedding::new(vec![0.0, 0.0])).unwrap();
        let (photo, _) = store.add_photo(&image, b"fake jpeg", None, None).unwrap();
        drop(store);

        let report = run_pass(&config).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.outcomes[&photo].unidentified_count, 1);

        let store = open_store(&config).unwrap();
        let tagged = store.photos_of(ada).unwrap();
        assert_eq!(tagged.len(), 1);
        assert!((tagged[0].confidence - 0.9).abs() < 1e-6);
    }
}
