pub mod command;
pub mod config;
pub mod diff;
pub mod error;
pub mod location;
pub mod plan;
pub mod remote;
pub mod transfer;
pub mod ui;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;

use command::Tools;
use config::Config;
use diff::{DiffMethod, DiffResult};
use location::{Endpoint, Listing, Location, LocationMeta, ScanOptions};
use plan::{Direction, Policy, build_plan};
use transfer::{Operation, run_plan};
use ui::{TerminalConfirm, TransferProgress};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "LOCSYNC_LOG";

static LONG_VERSION: Lazy<String> = Lazy::new(|| {
    match (
        option_env!("VERGEN_BUILD_DATE"),
        option_env!("VERGEN_CARGO_TARGET_TRIPLE"),
    ) {
        (Some(date), Some(target)) => {
            format!("{} (built {date} for {target})", env!("CARGO_PKG_VERSION"))
        }
        _ => env!("CARGO_PKG_VERSION").to_string(),
    }
});

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "locsync",
    version,
    long_version = LONG_VERSION.as_str(),
    about = "Compare file manifests and copy what differs between locations"
)]
pub struct Cli {
    /// More log output (repeat for more)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Config file (defaults to $LOCSYNC_CONFIG or the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct TransferArgs {
    /// Source manifest (YAML) or directory
    pub source: PathBuf,

    /// Destination directory (`host:path` for remote) or manifest
    pub dest: String,

    /// Remote host of the destination
    #[arg(long)]
    pub ssh: Option<String>,

    /// How to compare source and destination
    #[arg(short, long, value_enum)]
    pub method: Option<DiffMethod>,

    /// Make rsync compare full checksums
    #[arg(short, long)]
    pub checksum: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub force: bool,

    /// Print the plan and exit
    #[arg(short = 'n', long, conflicts_with = "force")]
    pub dry_run: bool,

    /// No progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Leave files that only exist at the destination alone instead of failing
    #[arg(long)]
    pub relaxed: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy the files of a location that are missing or different at the destination
    Cp(TransferArgs),
    /// Like cp, but move the files (local only)
    Mv(TransferArgs),
    /// Remove every file listed in a manifest
    Rm {
        /// Manifest (YAML) listing the files
        source: PathBuf,

        /// Do not ask for confirmation
        #[arg(short, long)]
        force: bool,

        /// Print what would be removed and exit
        #[arg(short = 'n', long, conflicts_with = "force")]
        dry_run: bool,

        /// No progress output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Compare two locations
    Diff {
        /// First location: manifest or directory
        a: PathBuf,

        /// Second location: manifest or directory (`host:path` for remote)
        b: String,

        /// Remote host of the second location
        #[arg(long)]
        ssh: Option<String>,

        #[arg(short, long, value_enum)]
        method: Option<DiffMethod>,

        /// Make rsync compare full checksums
        #[arg(short, long)]
        checksum: bool,

        /// With rsync, also run the swapped comparison to find files only in B
        #[arg(long)]
        both: bool,

        /// Write the result as YAML instead of printing a table
        #[arg(long, value_name = "FILE")]
        yaml: Option<PathBuf>,

        /// Print the result as JSON instead of a table
        #[arg(long, conflicts_with = "yaml")]
        json: bool,

        /// Overwrite the YAML output file
        #[arg(short, long)]
        force: bool,
    },
    /// Scan a directory and write its manifest
    Dump {
        /// Directory to scan
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Output manifest
        #[arg(short, long, default_value = "locsync_dump.yaml")]
        output: PathBuf,

        /// Keep only files matching this glob (repeatable)
        #[arg(long = "glob", value_name = "PATTERN")]
        patterns: Vec<String>,

        /// Skip files matching this regex (repeatable)
        #[arg(long, value_name = "REGEX")]
        skip: Vec<String>,

        /// Compute sha256, size and mtime
        #[arg(short, long)]
        info: bool,

        /// Overwrite the output file
        #[arg(short, long)]
        force: bool,
    },
    /// Fill in missing checksums of a manifest, in place
    Hash {
        manifest: PathBuf,

        /// Stop after hashing this many bytes (smallest files first)
        #[arg(long, value_name = "BYTES")]
        max_size: Option<u64>,

        /// First drop checksums of files whose size or mtime changed
        #[arg(long)]
        check: bool,
    },
    /// Re-run the dump or search listing of a manifest and write it back
    Update {
        manifest: PathBuf,

        /// Also compute checksums of files without one
        #[arg(short, long)]
        info: bool,
    },
    /// Merge a branch manifest into a main manifest
    Merge {
        /// Manifest whose files are added
        branch: PathBuf,

        /// Manifest that wins on duplicate paths (unless --replace)
        main: PathBuf,

        /// Output manifest
        #[arg(short, long)]
        output: PathBuf,

        /// Keep the branch's entry for paths present in both
        #[arg(long)]
        replace: bool,

        /// Overwrite the output file
        #[arg(short, long)]
        force: bool,
    },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

/// Install the global subscriber: `$LOCSYNC_LOG` if set, else a level from
/// the `-v` count. Logs go to stderr.
pub fn init_tracing(verbosity: u8) {
    let fallback = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_target(false)
        .try_init();
}

/// Everything a command needs besides its own arguments.
struct Session {
    config: Config,
    tools: Tools,
    colors: bool,
}

impl Session {
    fn new(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }
        .context("loading configuration")?;
        let tools = config.tools();
        let colors = !cli.no_color && config.defaults.colors;
        Ok(Self {
            config,
            tools,
            colors,
        })
    }
}

pub fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "locsync", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Man => {
            let man = clap_mangen::Man::new(Cli::command());
            man.render(&mut std::io::stdout())?;
            return Ok(());
        }
        _ => {}
    }

    let ctx = Session::new(&cli)?;
    match cli.command {
        Commands::Cp(args) => run_transfer(&ctx, &args, Operation::Copy),
        Commands::Mv(args) => run_transfer(&ctx, &args, Operation::Move),
        Commands::Rm {
            source,
            force,
            dry_run,
            quiet,
        } => run_remove(&ctx, &source, force, dry_run, quiet),
        Commands::Diff {
            a,
            b,
            ssh,
            method,
            checksum,
            both,
            yaml,
            json,
            force,
        } => {
            let b = parse_endpoint(&b, ssh.as_deref());
            let method = ctx.config.method(method, &ctx.tools);
            let output = match (yaml, json) {
                (Some(path), _) => DiffOutput::Yaml { path, force },
                (None, true) => DiffOutput::Json,
                (None, false) => DiffOutput::Table,
            };
            run_diff(&ctx, &a, b, method, checksum, both, &output)
        }
        Commands::Dump {
            root,
            output,
            patterns,
            skip,
            info,
            force,
        } => run_dump(&ctx, &root, &output, &patterns, &skip, info, force),
        Commands::Hash {
            manifest,
            max_size,
            check,
        } => run_hash(&ctx, &manifest, max_size, check),
        Commands::Update { manifest, info } => run_update(&ctx, &manifest, info),
        Commands::Merge {
            branch,
            main,
            output,
            replace,
            force,
        } => run_merge(&branch, &main, &output, replace, force),
        Commands::Completions { .. } | Commands::Man => Ok(()),
    }
}

/// `host:path` (host without `/`) or the `--ssh` host make a remote endpoint.
pub fn parse_endpoint(arg: &str, ssh: Option<&str>) -> Endpoint {
    if let Some(host) = ssh {
        return Endpoint::remote(host, arg);
    }
    match arg.split_once(':') {
        Some((host, path)) if !host.is_empty() && !host.contains('/') && !Path::new(arg).exists() => {
            Endpoint::remote(host, path)
        }
        _ => Endpoint::local(arg),
    }
}

fn is_manifest(path: &Path) -> bool {
    path.is_file()
}

/// A manifest file, or the files found under a local directory. A manifest
/// without files but with a `dump` or `search` key is listed first.
fn load_location(ctx: &Session, path: &Path) -> Result<Location> {
    if is_manifest(path) {
        let location = Location::from_yaml(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        if location.is_empty() && location.meta().listing.is_some() {
            return location
                .refreshed(&ctx.tools)
                .with_context(|| format!("listing files of {}", path.display()));
        }
        return Ok(location);
    }
    if path.is_dir() {
        return Location::scan(path, &ScanOptions::default())
            .with_context(|| format!("scanning {}", path.display()));
    }
    bail!("{} is neither a manifest nor a directory", path.display())
}

/// Source and destination at the same depth of the dataset: the destination
/// manifest, or the source's files that exist under the destination. A plain
/// directory has no prefix, so a prefixed source lands below `dest/prefix`.
fn destination(
    ctx: &Session,
    source: &Location,
    dest: &Endpoint,
    method: DiffMethod,
) -> Result<(Location, Location)> {
    let listed = if !dest.is_remote() && is_manifest(dest.root()) {
        Some(load_location(ctx, dest.root())?)
    } else {
        None
    };
    let target = listed.clone().unwrap_or_else(|| Location::empty(dest.clone()));
    let (source, target) = Location::align_prefixes(source, &target)
        .with_context(|| format!("matching {} with {dest}", source.endpoint()))?;
    if listed.is_some() {
        return Ok((source, target));
    }
    let target = match method {
        DiffMethod::Rsync => target,
        DiffMethod::Hash | DiffMethod::Exists => {
            let at = target.endpoint().clone();
            Location::probe(at.clone(), source.files(), &ctx.tools)
                .with_context(|| format!("looking for files at {at}"))?
        }
    };
    Ok((source, target))
}

/// `rm` and `mv` act on `root/path` only and refuse dataset fragments.
fn refuse_prefix(location: &Location, operation: &str) -> Result<()> {
    if let Some(prefix) = location.prefix() {
        return Err(error::SyncError::PrefixUnsupported {
            operation: operation.to_string(),
            prefix: prefix.to_path_buf(),
        }
        .into());
    }
    Ok(())
}

fn with_info(ctx: &Session, location: &Location) -> Result<Location> {
    let computed = location
        .with_computed_info(&ctx.tools)
        .with_context(|| format!("computing checksums in {}", location.endpoint()))?;
    for path in computed.missing() {
        eprintln!("warning: {} disappeared, treating its content as unknown", path.display());
    }
    Ok(computed.location)
}

fn compare(
    ctx: &Session,
    a: &Location,
    b: &Location,
    method: DiffMethod,
    checksum: bool,
) -> Result<DiffResult> {
    let backend = diff::backend_for(method, &ctx.tools, checksum);
    let result = match method {
        DiffMethod::Hash => backend.diff(&with_info(ctx, a)?, &with_info(ctx, b)?),
        DiffMethod::Exists | DiffMethod::Rsync => backend.diff(a, b),
    };
    result.with_context(|| format!("comparing {} with {}", a.endpoint(), b.endpoint()))
}

fn run_transfer(ctx: &Session, args: &TransferArgs, operation: Operation) -> Result<()> {
    let verb = match operation {
        Operation::Copy => "copy",
        Operation::Move => "move",
    };
    let source = load_location(ctx, &args.source)?;
    let dest = parse_endpoint(&args.dest, args.ssh.as_deref());
    if operation == Operation::Move {
        if source.endpoint().is_remote() || dest.is_remote() {
            bail!("mv only works between local directories");
        }
        refuse_prefix(&source, "mv")?;
    }
    if source.is_empty() {
        println!("Nothing to {verb}");
        return Ok(());
    }

    let method = ctx.config.method(args.method, &ctx.tools);
    let (source, dest) = destination(ctx, &source, &dest, method)?;
    let diff = compare(ctx, &source, &dest, method, args.checksum)?;

    let policy = Policy {
        method,
        force: args.force,
        dry_run: args.dry_run,
        direction: if args.relaxed {
            Direction::Relaxed
        } else {
            Direction::Strict
        },
    };
    let mut confirm = TerminalConfirm { colors: ctx.colors };
    let plan = build_plan(&diff, source.endpoint(), dest.endpoint(), policy, &mut confirm)?;

    if plan.is_noop() {
        println!("All files equal");
        return Ok(());
    }
    if args.dry_run {
        print!("{}", ui::render_plan(&plan, ctx.colors));
        return Ok(());
    }

    if !plan.dest().is_remote() && !plan.dest().root().as_os_str().is_empty() {
        let root = plan.dest().root();
        std::fs::create_dir_all(root).with_context(|| format!("creating {}", root.display()))?;
    }
    let show_progress = !args.quiet && ctx.config.defaults.progress;
    let executor = transfer::executor_for(&plan, &ctx.tools, operation, show_progress)?;
    let bar = TransferProgress::new(plan.transfer_count(), show_progress);
    let report = run_plan(executor.as_ref(), &plan, &mut |p| bar.update(p));
    bar.finish();
    let report = report.with_context(|| format!("{verb} to {} failed", plan.dest()))?;
    if !args.quiet {
        println!(
            "{} {} file(s) with {}",
            if operation == Operation::Copy { "Copied" } else { "Moved" },
            report.transferred.len(),
            report.executor
        );
    }
    Ok(())
}

fn run_remove(ctx: &Session, source: &Path, force: bool, dry_run: bool, quiet: bool) -> Result<()> {
    if !is_manifest(source) {
        bail!("{} is not a manifest file", source.display());
    }
    let location = Location::from_yaml(source)
        .with_context(|| format!("reading manifest {}", source.display()))?;
    refuse_prefix(&location, "rm")?;
    if location.is_empty() {
        println!("Nothing to remove");
        return Ok(());
    }
    if !force {
        for entry in location.entries() {
            println!("rm {}", location.endpoint().qualified(&entry.path));
        }
        if dry_run {
            return Ok(());
        }
        if !ui::ask("Proceed?") {
            return Err(error::SyncError::Cancelled.into());
        }
    }
    let show_progress = !quiet && ctx.config.defaults.progress;
    let bar = TransferProgress::new(location.len(), show_progress);
    let report = transfer::remove(&location, &ctx.tools, &mut |p| bar.update(p));
    bar.finish();
    let report = report.context("removing files")?;
    if !quiet {
        println!("Removed {} file(s)", report.transferred.len());
    }
    Ok(())
}

enum DiffOutput {
    Table,
    Json,
    Yaml { path: PathBuf, force: bool },
}

fn run_diff(
    ctx: &Session,
    a: &Path,
    b: Endpoint,
    method: DiffMethod,
    checksum: bool,
    both: bool,
    output: &DiffOutput,
) -> Result<()> {
    if let DiffOutput::Yaml { path, force: false } = output
        && path.exists()
    {
        bail!("{} exists, use --force to overwrite", path.display());
    }
    let a = load_location(ctx, a)?;
    let b_listed = if b.is_remote() {
        None
    } else {
        Some(load_location(ctx, b.root())?)
    };
    let target = b_listed.clone().unwrap_or_else(|| Location::empty(b.clone()));
    let (a, target) = Location::align_prefixes(&a, &target)
        .with_context(|| format!("matching {} with {b}", a.endpoint()))?;
    let b_listed = b_listed.map(|_| target.clone());
    let b_location = match (&b_listed, method) {
        (Some(listed), _) => listed.clone(),
        (None, DiffMethod::Rsync) => target.clone(),
        (None, _) => Location::probe(target.endpoint().clone(), a.files(), &ctx.tools)
            .with_context(|| format!("looking for files at {}", target.endpoint()))?,
    };

    let mut result = compare(ctx, &a, &b_location, method, checksum)?;
    if both && !result.dest_only_observed() {
        let listed = match &b_listed {
            Some(listed) => listed.clone(),
            None => remote_listing(ctx, target.endpoint())?,
        };
        let reverse = compare(ctx, &listed, &Location::empty(a.endpoint().clone()), method, checksum)?;
        result = result.with_reverse_pass(&reverse);
    }

    match output {
        DiffOutput::Yaml { path, .. } => {
            let text = result.to_yaml_string()?;
            std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
        }
        DiffOutput::Json => println!("{}", result.to_json_string()?),
        DiffOutput::Table => print!(
            "{}",
            ui::render_diff(&result, a.endpoint(), b_location.endpoint(), ctx.colors)
        ),
    }
    Ok(())
}

/// Every file below a remote root, listed over ssh.
fn remote_listing(ctx: &Session, endpoint: &Endpoint) -> Result<Location> {
    let meta = LocationMeta {
        listing: Some(Listing::all_files()),
        ..LocationMeta::default()
    };
    Location::empty(endpoint.clone())
        .with_meta(meta)
        .refreshed(&ctx.tools)
        .with_context(|| format!("listing files at {endpoint}"))
}

/// Root to store in a manifest written to `manifest`: `.` when it is the
/// manifest's own directory, otherwise absolute.
fn portable_root(root: &Path, manifest: &Path) -> PathBuf {
    let base = match manifest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let root_abs = std::fs::canonicalize(if root.as_os_str().is_empty() {
        Path::new(".")
    } else {
        root
    });
    match (root_abs, std::fs::canonicalize(base)) {
        (Ok(r), Ok(b)) if r == b => PathBuf::from("."),
        (Ok(r), _) => r,
        (Err(_), _) => root.to_path_buf(),
    }
}

fn relocated(location: &Location, manifest: &Path) -> Result<Location> {
    if location.endpoint().is_remote() {
        return Ok(location.clone());
    }
    let endpoint = Endpoint::local(portable_root(location.root(), manifest));
    Ok(Location::new(endpoint, location.entries().to_vec())?.with_meta(location.meta().clone()))
}

fn run_dump(
    ctx: &Session,
    root: &Path,
    output: &Path,
    patterns: &[String],
    skip: &[String],
    info: bool,
    force: bool,
) -> Result<()> {
    if output.exists() && !force {
        bail!("{} exists, use --force to overwrite", output.display());
    }
    let options = ScanOptions::parse(patterns, skip)?;
    let mut location = Location::scan(root, &options)
        .with_context(|| format!("scanning {}", root.display()))?;
    if let Ok(out_abs) = std::fs::canonicalize(output)
        && let Ok(relative) = out_abs.strip_prefix(std::fs::canonicalize(root)?)
    {
        location = location.without(&[relative]);
    }
    if info {
        location = with_info(ctx, &location)?;
    }
    relocated(&location, output)?
        .to_yaml(output)
        .with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(files = location.len(), output = %output.display(), "wrote manifest");
    Ok(())
}

fn run_hash(ctx: &Session, manifest: &Path, max_size: Option<u64>, check: bool) -> Result<()> {
    let mut location = Location::from_yaml(manifest)
        .with_context(|| format!("reading manifest {}", manifest.display()))?;
    if check {
        location = location.check_changes()?;
    }
    let computed = location
        .with_computed_info_limited(&ctx.tools, max_size)
        .with_context(|| format!("computing checksums in {}", location.endpoint()))?;
    for path in computed.missing() {
        eprintln!("warning: {} not found", path.display());
    }
    let pending = computed.location.entries().iter().filter(|e| !e.has_info()).count();
    relocated(&computed.location, manifest)?
        .to_yaml(manifest)
        .with_context(|| format!("writing {}", manifest.display()))?;
    if pending > 0 {
        println!("{pending} file(s) still without checksum");
    }
    Ok(())
}

fn run_update(ctx: &Session, manifest: &Path, info: bool) -> Result<()> {
    let location = Location::from_yaml(manifest)
        .with_context(|| format!("reading manifest {}", manifest.display()))?;
    if location.meta().listing.is_none() {
        bail!("{} has neither a dump nor a search key", manifest.display());
    }
    let mut location = location
        .refreshed(&ctx.tools)
        .with_context(|| format!("listing files of {}", manifest.display()))?;
    if info {
        location = with_info(ctx, &location)?;
    }
    relocated(&location, manifest)?
        .to_yaml(manifest)
        .with_context(|| format!("writing {}", manifest.display()))?;
    println!("{} file(s) in {}", location.len(), manifest.display());
    Ok(())
}

/// Both manifests seen from the higher of their roots, `main` winning on
/// duplicates unless `replace`.
fn merged(branch: &Location, main: &Location, replace: bool) -> Result<Location> {
    if branch.host() != main.host() {
        bail!(
            "cannot merge manifests of different hosts ({} and {})",
            branch.endpoint(),
            main.endpoint()
        );
    }
    let root = if branch.root().starts_with(main.root()) {
        main.root()
    } else if main.root().starts_with(branch.root()) {
        branch.root()
    } else {
        bail!(
            "{} and {} do not share a root",
            branch.endpoint(),
            main.endpoint()
        );
    };
    let (branch, main) = (branch.rebased(root)?, main.rebased(root)?);
    let (first, second) = if replace { (&branch, &main) } else { (&main, &branch) };
    Ok(first
        .merge(second)?
        .sorted()
        .with_meta(LocationMeta::default()))
}

fn run_merge(branch: &Path, main: &Path, output: &Path, replace: bool, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{} exists, use --force to overwrite", output.display());
    }
    let read = |path: &Path| {
        Location::from_yaml(path).with_context(|| format!("reading manifest {}", path.display()))
    };
    let location = merged(&read(branch)?, &read(main)?, replace)?;
    relocated(&location, output)?
        .to_yaml(output)
        .with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(files = location.len(), output = %output.display(), "wrote merged manifest");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(parse_endpoint("box:/data", None), Endpoint::remote("box", "/data"));
        assert_eq!(parse_endpoint("/data", Some("box")), Endpoint::remote("box", "/data"));
        assert_eq!(parse_endpoint("./a:b", None), Endpoint::local("./a:b"));
        assert_eq!(parse_endpoint("dir", None), Endpoint::local("dir"));
    }

    #[test]
    fn test_force_conflicts_with_dry_run() {
        let err = Cli::try_parse_from(["locsync", "cp", "-f", "-n", "a", "b"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_portable_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        let manifest = tmp.path().join("m.yaml");
        assert_eq!(portable_root(tmp.path(), &manifest), PathBuf::from("."));
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        let sub = portable_root(&tmp.path().join("sub"), &manifest);
        assert!(sub.is_absolute());
        assert!(sub.ends_with("sub"));
    }

    #[test]
    fn test_merged_rebases_branch() {
        let main = Location::from_paths(Endpoint::local("/data"), ["a", "b"]).unwrap();
        let branch = Location::new(
            Endpoint::local("/data/run1"),
            vec![location::ManifestEntry::with_checksum("x", "1")],
        )
        .unwrap();
        let out = merged(&branch, &main, false).unwrap();
        assert_eq!(out.root(), Path::new("/data"));
        assert_eq!(out.files(), [Path::new("a"), Path::new("b"), Path::new("run1/x")]);

        // main below branch: the branch root is the common one
        let out = merged(&main, &branch, false).unwrap();
        assert_eq!(out.root(), Path::new("/data"));
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_merged_duplicates() {
        let entry = |sum: &str| location::ManifestEntry::with_checksum("a", sum);
        let main = Location::new(Endpoint::local("/d"), vec![entry("1")]).unwrap();
        let branch = Location::new(Endpoint::local("/d"), vec![entry("2")]).unwrap();
        let keep = merged(&branch, &main, false).unwrap();
        assert_eq!(keep.entries()[0].checksum.as_deref(), Some("1"));
        let replaced = merged(&branch, &main, true).unwrap();
        assert_eq!(replaced.entries()[0].checksum.as_deref(), Some("2"));

        let elsewhere = Location::from_paths(Endpoint::local("/other"), ["a"]).unwrap();
        assert!(merged(&elsewhere, &main, false).is_err());
        let remote = Location::from_paths(Endpoint::remote("box", "/d"), ["a"]).unwrap();
        assert!(merged(&remote, &main, false).is_err());
    }
}
