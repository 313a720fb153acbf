pub mod audio_engine;
pub mod audio_io;
pub mod backend;
pub mod buffer;
pub mod codec;
pub mod controller;
pub mod error;
pub mod fx;
pub mod fx_components;
pub mod fx_graph;
pub mod history;
pub mod looper;
pub mod metronome;
pub mod mixer;
pub mod player;
pub mod recorder;
pub mod session;
pub mod settings;
pub mod shell;
pub mod transport;

#[cfg(test)]
pub mod testutil;
