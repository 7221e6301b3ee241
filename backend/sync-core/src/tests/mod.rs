mod persistence;
mod session;
mod state;
