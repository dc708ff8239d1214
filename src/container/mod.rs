mod launcher;

pub use launcher::Launcher;
