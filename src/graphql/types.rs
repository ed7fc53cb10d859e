//! GraphQL object and input types

use async_graphql::{InputObject, SimpleObject};

use crate::catalog::Book;
use crate::db::{
    AuthorRecord, CreateAuthor, CreateBook, CreateGenre, CreateReview, GenreRecord, Paginated,
    ReviewRecord, UpdateAuthor, UpdateBook, UpdateGenre, UpdateReview,
};

#[derive(Debug, Clone, SimpleObject)]
pub struct AuthorType {
    pub id: i64,
    pub name: String,
    pub bio: Option<String>,
    pub created_at: String,
}

impl From<AuthorRecord> for AuthorType {
    fn from(author: AuthorRecord) -> Self {
        Self {
            id: author.id,
            name: author.name,
            bio: author.bio,
            created_at: author.created_at,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct GenreType {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

impl From<GenreRecord> for GenreType {
    fn from(genre: GenreRecord) -> Self {
        Self {
            id: genre.id,
            name: genre.name,
            description: genre.description,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct BookType {
    pub id: i64,
    pub title: String,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub publication_date: Option<String>,
    pub page_count: Option<i64>,
    pub price: Option<f64>,
    pub average_rating: f64,
    pub review_count: i64,
    pub authors: Vec<AuthorType>,
    pub genres: Vec<GenreType>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Book> for BookType {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            title: book.title,
            isbn: book.isbn,
            description: book.description,
            publication_date: book.publication_date,
            page_count: book.page_count,
            price: book.price,
            average_rating: book.average_rating,
            review_count: book.review_count,
            authors: book.authors.into_iter().map(Into::into).collect(),
            genres: book.genres.into_iter().map(Into::into).collect(),
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct ReviewType {
    pub id: i64,
    pub book_id: i64,
    pub user_id: i64,
    pub rating: i64,
    pub title: Option<String>,
    pub content: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl From<ReviewRecord> for ReviewType {
    fn from(review: ReviewRecord) -> Self {
        Self {
            id: review.id,
            book_id: review.book_id,
            user_id: review.user_id,
            rating: review.rating,
            title: review.title,
            content: review.content,
            created_at: review.created_at,
            updated_at: review.updated_at,
        }
    }
}

/// One page of results. Exposed as `BookPage`, `AuthorPage`, `GenrePage`
/// and `ReviewPage`.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(concrete(name = "BookPage", params(BookType)))]
#[graphql(concrete(name = "AuthorPage", params(AuthorType)))]
#[graphql(concrete(name = "GenrePage", params(GenreType)))]
#[graphql(concrete(name = "ReviewPage", params(ReviewType)))]
pub struct Page<T: async_graphql::OutputType> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub pages: i64,
}

pub type BookPage = Page<BookType>;
pub type AuthorPage = Page<AuthorType>;
pub type GenrePage = Page<GenreType>;
pub type ReviewPage = Page<ReviewType>;

impl<R, T> From<Paginated<R>> for Page<T>
where
    T: async_graphql::OutputType + From<R>,
{
    fn from(page: Paginated<R>) -> Self {
        let page = page.map(T::from);
        Self {
            items: page.items,
            total: page.total,
            page: page.page,
            per_page: page.per_page,
            pages: page.pages,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct CreateBookInput {
    pub title: String,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub publication_date: Option<String>,
    pub page_count: Option<i64>,
    pub price: Option<f64>,
    #[graphql(default)]
    pub author_ids: Vec<i64>,
    #[graphql(default)]
    pub genre_ids: Vec<i64>,
}

impl From<CreateBookInput> for CreateBook {
    fn from(input: CreateBookInput) -> Self {
        Self {
            title: input.title,
            isbn: input.isbn,
            description: input.description,
            publication_date: input.publication_date,
            page_count: input.page_count,
            price: input.price,
            author_ids: input.author_ids,
            genre_ids: input.genre_ids,
        }
    }
}

/// Omitted fields keep their value. `authorIds` and `genreIds` replace the
/// whole set when given.
#[derive(Debug, InputObject)]
pub struct UpdateBookInput {
    pub title: Option<String>,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub publication_date: Option<String>,
    pub page_count: Option<i64>,
    pub price: Option<f64>,
    pub author_ids: Option<Vec<i64>>,
    pub genre_ids: Option<Vec<i64>>,
}

impl From<UpdateBookInput> for UpdateBook {
    fn from(input: UpdateBookInput) -> Self {
        Self {
            title: input.title,
            isbn: input.isbn,
            description: input.description,
            publication_date: input.publication_date,
            page_count: input.page_count,
            price: input.price,
            author_ids: input.author_ids,
            genre_ids: input.genre_ids,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct AuthorInput {
    pub name: String,
    pub bio: Option<String>,
}

impl From<AuthorInput> for CreateAuthor {
    fn from(input: AuthorInput) -> Self {
        Self {
            name: input.name,
            bio: input.bio,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct UpdateAuthorInput {
    pub name: Option<String>,
    pub bio: Option<String>,
}

impl From<UpdateAuthorInput> for UpdateAuthor {
    fn from(input: UpdateAuthorInput) -> Self {
        Self {
            name: input.name,
            bio: input.bio,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct GenreInput {
    pub name: String,
    pub description: Option<String>,
}

impl From<GenreInput> for CreateGenre {
    fn from(input: GenreInput) -> Self {
        Self {
            name: input.name,
            description: input.description,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct UpdateGenreInput {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl From<UpdateGenreInput> for UpdateGenre {
    fn from(input: UpdateGenreInput) -> Self {
        Self {
            name: input.name,
            description: input.description,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct CreateReviewInput {
    pub rating: i64,
    pub title: Option<String>,
    pub content: Option<String>,
}

impl From<CreateReviewInput> for CreateReview {
    fn from(input: CreateReviewInput) -> Self {
        Self {
            rating: input.rating,
            title: input.title,
            content: input.content,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct UpdateReviewInput {
    pub rating: Option<i64>,
    pub title: Option<String>,
    pub content: Option<String>,
}

impl From<UpdateReviewInput> for UpdateReview {
    fn from(input: UpdateReviewInput) -> Self {
        Self {
            rating: input.rating,
            title: input.title,
            content: input.content,
        }
    }
}
