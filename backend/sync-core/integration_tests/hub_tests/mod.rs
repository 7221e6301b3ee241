mod helpers;
mod lifecycle;
mod sync;
