pub mod authors;
pub mod books;
pub mod genres;
pub mod reviews;

pub use authors::AuthorMutations;
pub use books::BookMutations;
pub use genres::GenreMutations;
pub use reviews::ReviewMutations;
