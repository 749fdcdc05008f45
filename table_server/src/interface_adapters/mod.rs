// Interface adapters: wire protocol, network handling and scene loading.

pub mod clock;
pub mod http;
pub mod net;
pub mod protocol;
pub mod scene_file;
pub mod state;
pub mod utils;
