tonic::include_proto!("toolserver");
