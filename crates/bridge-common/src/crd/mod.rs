//! Resource types for the KServe serving objects the bridge watches.
//!
//! Only the fields the bridge reads are modelled; everything else in the
//! upstream schema is ignored on deserialize.

mod inference_service;

pub use inference_service::{
    ComponentStatus, InferenceService, InferenceServiceSpec, InferenceServiceStatus,
    ModelFormat, ModelSpec, ModelStatus, ModelStorage, PredictorSpec, ServingAddress,
    ServingCondition, INFERENCE_SERVICE_CRD_NAME, INGRESS_READY, PREDICTOR_READY, READY,
    TRANSITION_UP_TO_DATE,
};
