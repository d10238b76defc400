pub mod gatehouse {
    pub mod v1 {
        tonic::include_proto!("gatehouse.v1");
    }
}
