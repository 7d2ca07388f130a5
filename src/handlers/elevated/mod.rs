// handlers/elevated/mod.rs - Administrator-only handlers
//
// Route prefix: /api/admin/*
// Middleware: protected stack + Administrator role check
pub mod clients;
pub mod users;
