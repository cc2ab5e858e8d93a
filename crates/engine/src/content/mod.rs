mod asset_keys;
mod assets;
mod level;

pub use asset_keys::AssetKeyError;
pub use assets::{AssetError, AssetLoader, DownloadSummary, SpriteImage};
pub use level::{
    LevelBlock, LevelDef, LevelEntity, LevelError, LevelErrorCode, SourceLocation,
};
