mod admin;
mod www;
