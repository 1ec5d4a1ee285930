mod compile;
mod evaluate;
mod list;
