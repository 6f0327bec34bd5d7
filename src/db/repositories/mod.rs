pub mod cache_entries;
