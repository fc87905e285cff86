//! Database query operations organized by entity

pub mod bookmarks;

pub use bookmarks::{
    count_bookmarks, delete_bookmark, get_bookmark, insert_bookmark, list_bookmarks,
};
