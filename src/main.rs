use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use podaci::{
    BundleOutcome, ConfigOverrides, DocumentIndex, EffectiveConfig, ElasticIndex, FileSystem, GlobalConfig,
    MemoryIndex, Principal, SyncableDocument, TagScope,
};

#[derive(Parser)]
#[command(name = "podaci", about = "Content-addressed file store with tags and access lists")]
struct Cli {
    /// JSON config file; `podaci.json` in the working directory is used when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Acting user id; defaults to the OS user name.
    #[arg(long, global = true)]
    user: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store local files.
    Put { paths: Vec<PathBuf> },
    /// Register a remote file by URL.
    PutUrl {
        url: String,
        #[arg(long)]
        resident: bool,
    },
    /// Store every file under a directory.
    Import { dir: PathBuf },
    /// Write a file's bytes to stdout or `--out`.
    Get {
        id: String,
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    Info { id: String },
    Rm {
        id: String,
        #[arg(long)]
        yes: bool,
    },
    #[command(subcommand)]
    Tag(TagCommand),
    /// List your tags.
    Tags {
        #[arg(long, conflicts_with = "top")]
        under: Option<String>,
        #[arg(long)]
        top: bool,
    },
    /// List your files.
    Ls {
        #[arg(long)]
        tag: Option<String>,
        #[arg(long, default_value_t = 0)]
        from: usize,
        #[arg(long, default_value_t = 100)]
        size: usize,
    },
    Search {
        text: String,
        #[arg(long, default_value_t = 20)]
        size: usize,
    },
    /// Give another user access to a file (or a tag with `--tag`).
    Grant {
        id: String,
        user: String,
        #[arg(long)]
        write: bool,
        #[arg(long)]
        tag: bool,
    },
    Revoke {
        id: String,
        user: String,
        #[arg(long)]
        tag: bool,
    },
    Note { id: String, text: String },
}

#[derive(Subcommand)]
enum TagCommand {
    Create { name: String },
    /// Tag a file.
    Add { file: String, tag: String },
    Remove { file: String, tag: String },
    /// Add (or with `--remove`, drop) a parent of a tag.
    Parent {
        tag: String,
        parent: String,
        #[arg(long)]
        remove: bool,
    },
    Files { tag: String },
    Zip {
        tag: String,
        #[arg(long, short)]
        out: PathBuf,
    },
    Rm {
        tag: String,
        #[arg(long)]
        yes: bool,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EffectiveConfig> {
    let file_layer = match path {
        Some(p) => Some(ConfigOverrides::from_json_file(p).with_context(|| format!("reading {}", p.display()))?),
        None => {
            let default = Path::new("podaci.json");
            if default.is_file() { Some(ConfigOverrides::from_json_file(default)?) } else { None }
        }
    };
    let env_layer = ConfigOverrides::from_env();
    Ok(EffectiveConfig::from_layers(&GlobalConfig::default(), file_layer.as_ref(), Some(&env_layer)))
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;
    let user_id = cli.user.clone().unwrap_or_else(whoami::username);
    let user = Principal::new(user_id.clone(), user_id);

    // without a server URL the index lives next to the content
    let local = match cfg.index_url {
        Some(_) => None,
        None => Some(MemoryIndex::open(&cfg.local_index_dir())?),
    };
    let backend: Arc<dyn DocumentIndex> = match (&cfg.index_url, &local) {
        (Some(url), _) => Arc::new(ElasticIndex::new(url, cfg.request_timeout_ms, cfg.refresh_on_write)?),
        (None, Some(m)) => Arc::new(m.clone()),
        (None, None) => anyhow::bail!("no index backend configured"),
    };
    info!(
        target: "podaci",
        "podaci: index='{}' backend={} data_root='{}' user={}",
        cfg.index_name,
        cfg.index_url.as_deref().unwrap_or("local"),
        cfg.data_root.display(),
        user
    );

    let fs = FileSystem::connect(cfg, backend, Some(user))?;
    let result = run(&fs, cli.command);
    if let Some(m) = &local {
        m.save_snapshot()?;
    }
    result
}

fn run(fs: &FileSystem, command: Command) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    match command {
        Command::Put { paths } => {
            for p in paths {
                let res = fs.create_file_from_path(&p)?;
                writeln!(out, "{}\t{}\t{}", res.id().unwrap_or("-"), if res.created { "created" } else { "exists" }, p.display())?;
            }
        }
        Command::PutUrl { url, resident } => {
            let res = fs.create_file_from_url(&url, resident)?;
            match res.id() {
                Some(id) => writeln!(out, "{}\tcreated\t{}", id, url)?,
                None => writeln!(out, "-\texists\t{}", url)?,
            }
        }
        Command::Import { dir } => {
            let (mut created, mut reused) = (0usize, 0usize);
            for entry in WalkDir::new(&dir).follow_links(false) {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                match fs.create_file_from_path(entry.path()) {
                    Ok(r) if r.created => created += 1,
                    Ok(_) => reused += 1,
                    Err(e) => warn!(target: "podaci", "skipped {}: {}", entry.path().display(), e),
                }
            }
            writeln!(out, "imported {} new, {} already stored", created, reused)?;
        }
        Command::Get { id, out: dest } => {
            let file = fs.get_file_by_id(&id)?;
            let mut reader = file.get()?;
            match dest {
                Some(p) => {
                    let mut f = std::fs::File::create(&p)?;
                    io::copy(&mut reader, &mut f)?;
                }
                None => {
                    io::copy(&mut reader, &mut out)?;
                }
            }
        }
        Command::Info { id } => {
            let file = fs.get_file_by_id(&id)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&file.to_json()?)?)?;
        }
        Command::Rm { id, yes } => {
            fs.get_file_by_id(&id)?.delete(yes)?;
            writeln!(out, "deleted {}", id)?;
        }
        Command::Tag(cmd) => run_tag(fs, cmd, &mut out)?,
        Command::Tags { under, top } => {
            let user = fs.require_user()?;
            let scope = match (under, top) {
                (Some(parent), _) => TagScope::Under(parent),
                (None, true) => TagScope::TopLevel,
                (None, false) => TagScope::All,
            };
            let (total, tags) = fs.list_user_tags(&user, scope, 0, fs.config().list_cap)?;
            for t in &tags {
                writeln!(out, "{}\t{}", t.id().unwrap_or("-"), t.name())?;
            }
            writeln!(out, "{} of {} tags", tags.len(), total)?;
        }
        Command::Ls { tag, from, size } => {
            let user = fs.require_user()?;
            let (total, files) = fs.list_user_files(&user, tag.as_deref(), from, size)?;
            for f in &files {
                writeln!(out, "{}", f)?;
            }
            writeln!(out, "{} of {} files", files.len(), total)?;
        }
        Command::Search { text, size } => {
            for item in fs.search_all_by_name(&text, 0, size)? {
                writeln!(out, "{}\t{}\t{}", item.kind, item.id, item.name)?;
            }
        }
        Command::Grant { id, user, write, tag } => {
            let who = Principal::new(user.clone(), user);
            if tag {
                fs.get_tag(&id)?.add_user(&who, write)?;
            } else {
                fs.get_file_by_id(&id)?.add_user(&who, write)?;
            }
        }
        Command::Revoke { id, user, tag } => {
            let who = Principal::new(user.clone(), user);
            if tag {
                fs.get_tag(&id)?.remove_user(&who)?;
            } else {
                fs.get_file_by_id(&id)?.remove_user(&who)?;
            }
        }
        Command::Note { id, text } => {
            fs.get_file_by_id(&id)?.add_note(&text)?;
        }
    }
    Ok(())
}

fn run_tag(fs: &FileSystem, cmd: TagCommand, out: &mut impl Write) -> anyhow::Result<()> {
    match cmd {
        TagCommand::Create { name } => {
            let t = fs.create_tag(&name)?;
            writeln!(out, "{}\t{}", t.id().unwrap_or("-"), t.name())?;
        }
        TagCommand::Add { file, tag } => {
            let tag = fs.get_tag(&tag)?;
            let id = tag.id().context("tag has no id")?;
            fs.get_file_by_id(&file)?.add_tag(id)?;
        }
        TagCommand::Remove { file, tag } => {
            fs.get_file_by_id(&file)?.remove_tag(&tag)?;
        }
        TagCommand::Parent { tag, parent, remove } => {
            let mut t = fs.get_tag(&tag)?;
            if remove {
                t.remove_parent(&parent)?;
            } else {
                fs.get_tag(&parent)?;
                t.add_parent(&parent)?;
            }
        }
        TagCommand::Files { tag } => {
            let (total, files) = fs.get_tag(&tag)?.list_files()?;
            for f in &files {
                writeln!(out, "{}", f)?;
            }
            writeln!(out, "{} of {} files", files.len(), total)?;
        }
        TagCommand::Zip { tag, out: dest } => match fs.get_tag(&tag)?.build_zip_bundle()? {
            BundleOutcome::Archive(bytes) => {
                std::fs::write(&dest, &bytes)?;
                writeln!(out, "wrote {} bytes to {}", bytes.len(), dest.display())?;
            }
            BundleOutcome::TooLarge { total_bytes, limit_bytes } => {
                anyhow::bail!("bundle too large: {} bytes exceeds the {} byte limit", total_bytes, limit_bytes);
            }
        },
        TagCommand::Rm { tag, yes } => {
            fs.get_tag(&tag)?.delete(yes)?;
            writeln!(out, "deleted tag {}", tag)?;
        }
    }
    Ok(())
}
