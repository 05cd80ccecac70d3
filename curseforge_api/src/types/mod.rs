mod meta;
pub use self::meta::{PaginatedResponse, Pagination};

mod addon;
pub use self::addon::{Author, Category, File, FileIndex, Logo, Mod, ModID};
