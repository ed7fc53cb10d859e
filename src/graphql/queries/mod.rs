pub mod authors;
pub mod books;
pub mod genres;
pub mod reviews;

pub use authors::AuthorQueries;
pub use books::BookQueries;
pub use genres::GenreQueries;
pub use reviews::ReviewQueries;
