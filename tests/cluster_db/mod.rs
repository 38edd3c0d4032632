mod snapshot_catch_up_case;
