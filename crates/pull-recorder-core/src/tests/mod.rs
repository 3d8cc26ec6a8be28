mod controller;
mod fakes;
mod inference;
mod persistence;
mod sampler;
