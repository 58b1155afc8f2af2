mod concurrency;
mod persistence;
mod support;
mod timeouts;
