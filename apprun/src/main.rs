#![windows_subsystem = "windows"]

use std::{
    env::{args_os, consts::ARCH, current_exe},
    fs::File,
};

use memmap2::Mmap;

#[macro_use]
mod log;

mod command;
use command::*;

mod error;
use error::*;

mod extract;
use extract::*;

mod permissions;

mod types;
use types::*;

fn launch() -> Result<i32, RunError> {
    let exe = current_exe().map_err(RunError::CurrentExe)?;
    debug_log!("{} {} reading {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), exe.display());
    let file = File::open(&exe)?;
    let mmap = unsafe { Mmap::map(&file)? };

    let layout = Layout::read(&mmap)?;
    debug_log!("{:?} container, sections: {:?}", layout.variant, layout.sections);

    let context = ExtractionContext::for_process(std::process::id());
    let extracted = extract(&mmap, &layout, &context, ARCH)?;
    drop(mmap);

    if let Some(assets) = &extracted.assets {
        debug_log!("assets at {}", assets.display());
    }
    debug_log!("running {}", extracted.binary.display());
    run(&extracted.binary, args_os().skip(1), &extracted.environment())
}

fn main() {
    #[cfg(windows)]
    unsafe {
        use windows_sys::Win32::System::Console::{AttachConsole, ATTACH_PARENT_PROCESS};
        AttachConsole(ATTACH_PARENT_PROCESS);
    }

    let code = launch().unwrap_or_else(|e| {
        eprintln!("apprun: {}", e);
        e.exit_code()
    });
    std::process::exit(code);
}
