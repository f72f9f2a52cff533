pub mod answer_route;
