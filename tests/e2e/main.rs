//! End-to-end scenarios for projpack containers, locks and collaboration
//! sidecars, with several simulated processes sharing one directory.
