pub mod http_predictor;
