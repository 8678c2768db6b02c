use clap::{Args as ClapArgs, Parser, Subcommand};
use graft_core::json::JsonOpts;
use graft_core::{DecodeOpts, Node, Patcher};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "graft",
    about = "Decode, inspect and patch compiled units with ordered transformer plans",
    version
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Dump a unit file or a directory of units as JSON
    Dump(DumpArgs),
    /// Encode a JSON tree (as produced by dump --lossless) into a unit file
    Encode(EncodeArgs),
    /// Print the node at a pointer as JSON
    Get(GetArgs),
    /// Apply a transformer plan to a unit file or a directory of units
    Patch(PatchArgs),
}

#[derive(ClapArgs, Debug)]
struct DumpArgs {
    /// Unit file or directory to dump
    path: PathBuf,
    /// Max array elements to include per array
    #[arg(long, default_value_t = 128)]
    max_array: usize,
    /// Max recursion depth
    #[arg(long, default_value_t = 16)]
    max_depth: usize,
    /// Emit full bytes instead of summaries
    #[arg(long, default_value_t = false)]
    bytes_full: bool,
    /// No truncation and full bytes, suitable for `encode`
    #[arg(long, default_value_t = false)]
    lossless: bool,
}

#[derive(ClapArgs, Debug)]
struct EncodeArgs {
    /// Input JSON path
    #[arg(long, value_name = "JSON")]
    input: PathBuf,
    /// Output unit path
    #[arg(long, value_name = "UNIT")]
    output: PathBuf,
}

#[derive(ClapArgs, Debug)]
struct GetArgs {
    /// Unit file to load
    path: PathBuf,
    /// Pointer, e.g. /functions/0/name
    #[arg(long)]
    ptr: String,
    /// Decode containers at this depth and below only when addressed
    #[arg(long)]
    lazy_depth: Option<usize>,
}

#[derive(ClapArgs, Debug)]
struct PatchArgs {
    /// Unit file or directory of units
    path: PathBuf,
    /// Plan JSON describing transformers
    #[arg(long)]
    plan: PathBuf,
    /// Output unit path (single file only); defaults to rewriting in place
    #[arg(long)]
    out: Option<PathBuf>,
    /// Print rounds and the derived order without writing anything
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Skip the zip backup taken before patching a directory in place
    #[arg(long, default_value_t = false)]
    no_backup: bool,
    /// Decode containers at this depth and below only when addressed
    #[arg(long)]
    lazy_depth: Option<usize>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("graft=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Dump(a) => cmd_dump(a),
        Cmd::Encode(a) => cmd_encode(a),
        Cmd::Get(a) => cmd_get(a),
        Cmd::Patch(a) => cmd_patch(a),
    }
}

fn fail(code: i32, msg: impl std::fmt::Display) -> ! {
    eprintln!("error: {}", msg);
    std::process::exit(code);
}

fn cmd_dump(args: DumpArgs) {
    let opts = if args.lossless {
        JsonOpts::lossless()
    } else {
        JsonOpts {
            max_array_elems: args.max_array,
            max_depth: args.max_depth,
            bytes_summary: !args.bytes_full,
        }
    };
    let p = args.path.as_path();
    let res = if p.is_file() {
        graft_core::json::dump_file_json(p, opts)
    } else if p.is_dir() {
        graft_core::json::dump_dir_json(p, opts)
    } else {
        fail(2, format!("not found: {}", p.display()));
    };
    match res {
        Ok(s) => println!("{}", s),
        Err(e) => fail(2, e),
    }
}

fn cmd_encode(args: EncodeArgs) {
    let data = std::fs::read_to_string(&args.input)
        .unwrap_or_else(|e| fail(2, format!("reading JSON: {}", e)));
    let value: serde_json::Value =
        serde_json::from_str(&data).unwrap_or_else(|e| fail(3, format!("invalid JSON: {}", e)));
    let root = graft_core::json_to_node(&value);
    graft_core::write_unit_file(&args.output, &root).unwrap_or_else(|e| fail(4, e));
}

fn cmd_get(args: GetArgs) {
    let opts = DecodeOpts {
        lazy_depth: args.lazy_depth,
    };
    let root = graft_core::read_unit_file(&args.path, opts).unwrap_or_else(|e| fail(2, e));
    let node = root
        .pointer_path(&args.ptr)
        .and_then(|path| root.get(&path).cloned())
        .unwrap_or_else(|e| fail(3, e));
    let json = graft_core::node_to_json(&node, JsonOpts::default());
    println!(
        "{}",
        serde_json::to_string_pretty(&json).unwrap_or_else(|e| fail(5, e))
    );
}

fn cmd_patch(args: PatchArgs) {
    let plan_text =
        std::fs::read_to_string(&args.plan).unwrap_or_else(|e| fail(2, format!("reading plan: {}", e)));
    let plan = graft_core::load_plan(&plan_text).unwrap_or_else(|e| fail(3, e));
    let patcher = Patcher::new(plan.into_transformers()).unwrap_or_else(|e| fail(3, e));
    for (i, round) in patcher.round_ids().iter().enumerate() {
        tracing::info!(round = i, transformers = ?round, "round");
    }
    let opts = DecodeOpts {
        lazy_depth: args.lazy_depth,
    };

    let p = args.path.as_path();
    if p.is_dir() {
        if args.out.is_some() {
            fail(2, "--out is only valid for a single unit file");
        }
        let files = graft_core::units::find_unit_files(p).unwrap_or_else(|e| fail(2, e));
        if !args.dry_run && !args.no_backup {
            graft_core::units::zip_backup_dir(p).unwrap_or_else(|e| fail(5, format!("backup: {}", e)));
        }
        for f in files {
            patch_file(&patcher, &f, &f, args.dry_run, opts);
        }
    } else if p.is_file() {
        let out = args.out.clone().unwrap_or_else(|| p.to_path_buf());
        patch_file(&patcher, p, &out, args.dry_run, opts);
    } else {
        fail(2, format!("not found: {}", p.display()));
    }
}

fn patch_file(patcher: &Patcher, input: &Path, output: &Path, dry_run: bool, opts: DecodeOpts) {
    let mut root: Node = graft_core::read_unit_file(input, opts).unwrap_or_else(|e| fail(2, e));
    if dry_run {
        // Only the first round can be planned without applying anything.
        let planned = patcher.plan_round(0, &root).unwrap_or_else(|e| fail(4, e));
        println!("{}:", input.display());
        for &i in &planned.schedule.order {
            let t = &planned.transformations[i];
            let forced = if planned.schedule.forced.contains(&i) {
                " (soft dependencies broken)"
            } else {
                ""
            };
            println!("  {}\t{}{}", t.id(), t.target().path(), forced);
        }
        return;
    }
    let report = patcher.run(&mut root).unwrap_or_else(|e| fail(4, e));
    graft_core::write_unit_file(output, &root).unwrap_or_else(|e| fail(5, e));
    println!(
        "{}: {} transformations in {} rounds",
        input.display(),
        report.applied(),
        report.rounds.len()
    );
}
