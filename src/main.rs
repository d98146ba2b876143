#![deny(clippy::all)]
#![forbid(unsafe_code)]

use clap::Parser;

use rvolume::{
    cfg,
    result::{trace_ok_err, VolErrorKind, VolResult},
    tracing_setup,
    volume::{create_volume, create_volume_with_only_cover, CacheMode},
    volerr, ImageContent,
};
use std::{ops::Deref, panic, process};
use tracing::error;

/// Walks a volume page by page and prints what each page decodes to.
#[derive(Parser)]
struct Cli {
    /// directory, archive, image file, or composite `<volume>::<entry>` path
    path: String,
    /// print only the cover page
    #[arg(short, long)]
    cover_only: bool,
    /// schedule only navigated pages, no neighbor prefetch
    #[arg(short, long)]
    fast_forward: bool,
    /// decode on the main thread without worker threads
    #[arg(long)]
    no_async: bool,
    /// walk at most this many pages
    #[arg(short, long)]
    n_pages: Option<usize>,
}

fn print_page(content: &ImageContent) {
    println!(
        "{}: {} -> {}, {}",
        content.path(),
        content.base_size(),
        content.import_size(),
        content.info()
    );
}

fn walk_volume(cli: &Cli) -> VolResult<()> {
    let mut cfg = cfg::get_cfg();
    if cli.fast_forward {
        cfg.cache_mode = CacheMode::FastForward;
    }
    if cli.no_async {
        cfg.cache_mode = CacheMode::NoAsync;
    }
    if cli.cover_only {
        let mut navigator = create_volume_with_only_cover(&cli.path, &cfg).ok_or_else(|| {
            volerr!(VolErrorKind::VolumeCreation, "could not open {}", cli.path)
        })?;
        let cover = navigator.current_image()?;
        print_page(&cover);
        return Ok(());
    }
    let mut navigator = create_volume(&cli.path, &cfg)
        .ok_or_else(|| volerr!(VolErrorKind::VolumeCreation, "could not open {}", cli.path))?;
    println!(
        "{} with {} pages",
        navigator.volume_path(),
        navigator.size()
    );
    let mut n_failed = 0usize;
    let mut n_visited = 0usize;
    let n_pages = cli.n_pages.unwrap_or(usize::MAX);
    while n_visited < n_pages && navigator.next_page() {
        n_visited += 1;
        match navigator.current_image() {
            Ok(content) => print_page(&content),
            Err(e) => {
                n_failed += 1;
                error!("page {:?} failed with {e}", navigator.current_path());
            }
        }
    }
    if n_failed > 0 {
        return Err(volerr!(
            VolErrorKind::DecodeFailure,
            "{n_failed} of {n_visited} pages failed"
        ));
    }
    Ok(())
}

fn main() {
    let _guard_flush_to_logfile = tracing_setup::tracing_setup();
    if let Err(e) = panic::catch_unwind(|| {
        let cli = Cli::parse();
        if trace_ok_err(walk_volume(&cli)).is_none() {
            process::exit(1);
        }
    }) {
        let panic_s = e
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| e.downcast_ref::<&'static str>().map(Deref::deref));
        tracing::error!("{:?}", panic_s);
        let b = tracing_setup::BACKTRACE
            .with(|b| b.borrow_mut().take())
            .unwrap();
        tracing::error!("{:?}", b);
    }
}

#[cfg(test)]
use {
    rvolume::{decode::encode_test_png, defer_folder_removal, file_util::DEFAULT_TMPDIR},
    std::fs,
};

#[test]
fn test_walk_volume() {
    let tmp = DEFAULT_TMPDIR.join("cli_walk_test");
    fs::create_dir_all(&tmp).unwrap();
    defer_folder_removal!(&tmp);
    let png = encode_test_png(4, 4);
    fs::write(tmp.join("p1.png"), &png).unwrap();
    fs::write(tmp.join("p2.png"), &png).unwrap();
    let cli = Cli {
        path: tmp.to_str().unwrap().to_string(),
        cover_only: false,
        fast_forward: false,
        no_async: true,
        n_pages: None,
    };
    walk_volume(&cli).unwrap();
    let cli = Cli {
        cover_only: true,
        ..cli
    };
    walk_volume(&cli).unwrap();
    let cli = Cli {
        path: "/definitely/not/there".to_string(),
        ..cli
    };
    assert!(walk_volume(&cli).is_err());
}
