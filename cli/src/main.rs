use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use memmap2::Mmap;
use qsdiff::{
    DiffParams, Patch,
    compress::Zstd,
    tree::{self, Change},
};
use std::{
    fmt::Write as _,
    fs::{self, File},
    io::Write,
    ops::Deref,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// bsdiff-style binary diffs over a suffix array
#[derive(Parser, Debug)]
#[command(name = "qsdiff", version, arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Write a patch that turns OLD into NEW
    Diff {
        old: PathBuf,
        new: PathBuf,
        patch: PathBuf,
        #[command(flatten)]
        tuning: Tuning,
    },
    /// Rebuild DESTFILE from FROMFILE and PATCHFILE
    Patch {
        fromfile: Option<PathBuf>,
        destfile: Option<PathBuf>,
        patchfile: Option<PathBuf>,
    },
    /// Compare two unpacked trees and write a patch directory to OUT
    ///
    /// OUT gets a MANIFEST listing every file as delete, new, same or patch,
    /// copies of new files under new/, and one patch per changed file under
    /// patch/ (named after the file, with a .qsdiff suffix).
    Dir {
        old_dir: PathBuf,
        new_dir: PathBuf,
        out: PathBuf,
        #[command(flatten)]
        tuning: Tuning,
    },
    /// Diff, patch in memory, and check the result hashes the same as NEW
    Cycle {
        old: PathBuf,
        new: PathBuf,
        #[command(flatten)]
        tuning: Tuning,
    },
}

#[derive(clap::Args, Debug)]
struct Tuning {
    /// How much longer a fresh match must be before the scan cuts over to it
    #[arg(long, default_value_t = DiffParams::DEFAULT_MARGIN)]
    margin: usize,

    /// zstd compression level for the patch streams
    #[arg(long, default_value_t = Zstd::DEFAULT_LEVEL, allow_negative_numbers = true)]
    level: i32,
}

impl Tuning {
    fn build(&self) -> Result<(DiffParams, Zstd)> {
        Ok((DiffParams::new(self.margin, None)?, Zstd::new(self.level)?))
    }
}

/// A read-only view of an input file. Empty files are not mapped.
enum Input {
    Mapped(Mmap),
    Empty,
}

impl Deref for Input {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Input::Mapped(map) => map,
            Input::Empty => &[],
        }
    }
}

fn map_input(path: &Path) -> Result<Input> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    if file.metadata()?.len() == 0 {
        return Ok(Input::Empty);
    }
    // SAFETY: the mapping is only read, and only while this process runs
    // the command. Concurrent truncation by another process is not guarded.
    let map = unsafe { Mmap::map(&file) }.with_context(|| format!("mapping {}", path.display()))?;
    Ok(Input::Mapped(map))
}

/// Write `data` next to `path` and rename it into place.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating a temporary file in {}", dir.display()))?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn do_diff(old: &Path, new: &Path, patch: &Path, tuning: &Tuning) -> Result<()> {
    let start = Instant::now();
    let (params, zstd) = tuning.build()?;

    let obuf = map_input(old)?;
    let nbuf = map_input(new)?;

    let bytes = qsdiff::simple_diff_with_params(&obuf, &nbuf, &params, &zstd)?;
    write_atomic(patch, &bytes)?;

    info!(
        "wrote {} byte patch for {} -> {} bytes in {:?}",
        bytes.len(),
        obuf.len(),
        nbuf.len(),
        start.elapsed()
    );
    Ok(())
}

fn do_patch(fromfile: &Path, destfile: &Path, patchfile: &Path) -> Result<()> {
    let start = Instant::now();

    let older = map_input(fromfile)?;
    let patch = map_input(patchfile)?;

    let fresh = qsdiff::simple_patch(&older, &patch)
        .with_context(|| format!("applying {}", patchfile.display()))?;
    write_atomic(destfile, &fresh)?;

    info!("wrote {} bytes in {:?}", fresh.len(), start.elapsed());
    Ok(())
}

fn manifest_tag(change: Change) -> &'static str {
    match change {
        Change::Deleted => "delete",
        Change::Added => "new",
        Change::Unchanged => "same",
        Change::Modified => "patch",
    }
}

fn patch_name(rel: &Path) -> PathBuf {
    let mut name = rel.as_os_str().to_owned();
    name.push(".qsdiff");
    PathBuf::from(name)
}

fn write_under(root: &Path, rel: &Path, data: &[u8]) -> Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    write_atomic(&path, data)
}

fn do_dir(old_dir: &Path, new_dir: &Path, out: &Path, tuning: &Tuning) -> Result<()> {
    let start = Instant::now();
    let (params, zstd) = tuning.build()?;

    let td = tree::compare(old_dir, new_dir)
        .with_context(|| format!("comparing {} with {}", old_dir.display(), new_dir.display()))?;
    info!(
        "{} deleted, {} new, {} unchanged, {} changed",
        td.deleted.len(),
        td.added.len(),
        td.unchanged.len(),
        td.modified.len()
    );

    fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;

    let mut patch_bytes = 0usize;
    for rel in &td.modified {
        let bytes = tree::diff_file(old_dir, new_dir, rel, &params, &zstd)
            .with_context(|| format!("diffing {}", rel.display()))?;
        patch_bytes += bytes.len();
        write_under(&out.join("patch"), &patch_name(rel), &bytes)?;
    }
    for rel in &td.added {
        let data = fs::read(new_dir.join(rel))
            .with_context(|| format!("reading {}", new_dir.join(rel).display()))?;
        write_under(&out.join("new"), rel, &data)?;
    }

    let mut manifest = String::new();
    for (rel, change) in td.entries() {
        writeln!(manifest, "{}\t{}", manifest_tag(change), rel.display())?;
    }
    write_atomic(&out.join("MANIFEST"), manifest.as_bytes())?;

    info!(
        "wrote {} bytes of patches to {} in {:?}",
        patch_bytes,
        out.display(),
        start.elapsed()
    );
    Ok(())
}

fn do_cycle(old: &Path, new: &Path, tuning: &Tuning) -> Result<()> {
    let (params, zstd) = tuning.build()?;

    let obuf = map_input(old)?;
    let nbuf = map_input(new)?;
    info!("before {} bytes, after {} bytes", obuf.len(), nbuf.len());

    let start = Instant::now();
    let bytes = qsdiff::simple_diff_with_params(&obuf, &nbuf, &params, &zstd)?;
    info!("diff took {:?}", start.elapsed());

    let start = Instant::now();
    let fresh = Patch::from_bytes(&bytes, &zstd)?.apply(&obuf)?;
    info!("patch took {:?}", start.elapsed());

    let ratio = if nbuf.is_empty() {
        0.0
    } else {
        bytes.len() as f64 / nbuf.len() as f64
    };
    info!(
        "patch size: {} bytes ({:.2}% of newer)",
        bytes.len(),
        ratio * 100.0
    );

    if blake3::hash(&fresh) != blake3::hash(&nbuf) {
        bail!("hash mismatch!");
    }
    info!("hashes match");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Cmd::Diff {
            old,
            new,
            patch,
            tuning,
        } => do_diff(&old, &new, &patch, &tuning),
        Cmd::Patch {
            fromfile: Some(fromfile),
            destfile: Some(destfile),
            patchfile: Some(patchfile),
        } => do_patch(&fromfile, &destfile, &patchfile),
        Cmd::Patch { .. } => {
            // missing operands are a usage request, not a failure
            let mut cmd = Cli::command();
            if let Some(patch) = cmd.find_subcommand_mut("patch") {
                patch.print_help()?;
            }
            Ok(())
        }
        Cmd::Dir {
            old_dir,
            new_dir,
            out,
            tuning,
        } => do_dir(&old_dir, &new_dir, &out, &tuning),
        Cmd::Cycle { old, new, tuning } => do_cycle(&old, &new, &tuning),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn patch_operands_are_optional() {
        let cli = Cli::try_parse_from(["qsdiff", "patch", "old.bin"]).unwrap();
        assert!(matches!(
            cli.command,
            Cmd::Patch {
                fromfile: Some(_),
                destfile: None,
                patchfile: None
            }
        ));
    }

    #[test]
    fn tuning_defaults() {
        let cli = Cli::try_parse_from(["qsdiff", "cycle", "a", "b"]).unwrap();
        let Cmd::Cycle { tuning, .. } = cli.command else {
            panic!("expected cycle");
        };
        assert_eq!(tuning.margin, 8);
        assert_eq!(tuning.level, 19);
        assert!(tuning.build().is_ok());
    }

    #[test]
    fn bad_level_is_rejected() {
        let cli = Cli::try_parse_from(["qsdiff", "diff", "a", "b", "p", "--level", "1000"]).unwrap();
        let Cmd::Diff { tuning, .. } = cli.command else {
            panic!("expected diff");
        };
        assert!(tuning.build().is_err());
    }

    #[test]
    fn files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (old, new, patch, out, empty) = (
            dir.path().join("old"),
            dir.path().join("new"),
            dir.path().join("patch"),
            dir.path().join("out"),
            dir.path().join("empty"),
        );
        std::fs::write(&old, b"the quick brown fox jumps over the lazy dog").unwrap();
        std::fs::write(&new, b"the quick brown cat jumps over the lazy dog!").unwrap();
        std::fs::write(&empty, b"").unwrap();

        let tuning = Tuning {
            margin: 8,
            level: 3,
        };
        do_diff(&old, &new, &patch, &tuning).unwrap();
        do_patch(&old, &out, &patch).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), std::fs::read(&new).unwrap());

        do_cycle(&old, &new, &tuning).unwrap();
        do_cycle(&empty, &new, &tuning).unwrap();
        do_cycle(&new, &empty, &tuning).unwrap();
    }

    #[test]
    fn dir_writes_manifest_and_patches() {
        let work = tempfile::tempdir().unwrap();
        let (old, new, out) = (
            work.path().join("old"),
            work.path().join("new"),
            work.path().join("out"),
        );
        for (root, rel, data) in [
            (&old, "keep.txt", &b"unchanged"[..]),
            (&new, "keep.txt", &b"unchanged"[..]),
            (&old, "gone.txt", &b"bye"[..]),
            (&new, "lib/added.so", &b"hello"[..]),
            (&old, "res/values.arsc", &b"the quick brown fox jumps over the lazy dog"[..]),
            (&new, "res/values.arsc", &b"the quick brown cat jumps over the lazy dog!"[..]),
        ] {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, data).unwrap();
        }

        let tuning = Tuning {
            margin: 8,
            level: 3,
        };
        do_dir(&old, &new, &out, &tuning).unwrap();

        assert_eq!(
            fs::read_to_string(out.join("MANIFEST")).unwrap(),
            "delete\tgone.txt\nsame\tkeep.txt\nnew\tlib/added.so\npatch\tres/values.arsc\n"
        );
        assert_eq!(fs::read(out.join("new/lib/added.so")).unwrap(), b"hello");

        let patch = fs::read(out.join("patch/res/values.arsc.qsdiff")).unwrap();
        let fresh = qsdiff::simple_patch(&fs::read(old.join("res/values.arsc")).unwrap(), &patch).unwrap();
        assert_eq!(fresh, fs::read(new.join("res/values.arsc")).unwrap());
        assert!(!out.join("patch/keep.txt.qsdiff").exists());
    }
}
